//! Google Gemini 텍스트 생성 클라이언트
//!
//! generateContent REST API를 사용합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

use super::{classify_request_error, LanguageModel};

/// Gemini API 키 환경변수 (앞쪽 우선)
pub const GEMINI_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 환경변수에서 Gemini API 키 조회
pub fn gemini_api_key() -> Option<String> {
    GEMINI_KEY_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|key| !key.trim().is_empty())
}

/// Gemini 생성 모델
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiModel {
    pub fn new(client: reqwest::Client, api_key: String, model: &str, temperature: f32) -> Self {
        Self {
            client,
            api_key,
            model: model.to_string(),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: 8192,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_request_error("Gemini API", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error("Gemini API", e))?;

        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(RagError::BackendUnavailable(format!("Gemini API: {}", body)));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("Gemini API error ({}): {}", status, body).into());
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("Failed to parse Gemini response: {}", e))?;

        Ok(parsed.text())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// 첫 번째 후보의 텍스트 파트 결합
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}
