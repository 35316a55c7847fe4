//! Ollama 로컬 모델 클라이언트
//!
//! `/api/chat` 비스트리밍 호출을 사용합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

use super::{classify_request_error, LanguageModel};

/// 기본 Ollama 서버 주소
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Ollama 채팅 모델
pub struct OllamaModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaModel {
    pub fn new(client: reqwest::Client, host: &str, model: &str, temperature: f32) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/chat", host.trim_end_matches('/')),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_request_error("Ollama", e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_request_error("Ollama", e))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            // 모델이 pull되지 않은 경우
            return Err(RagError::BackendUnavailable(format!(
                "Ollama model '{}' not available: {}",
                self.model, body
            )));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("Ollama error ({}): {}", status, body).into());
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("Failed to parse Ollama response: {}", e))?;

        Ok(strip_reasoning(&parsed.message.content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// 추론형 모델의 `<think>...</think>` 블록 제거
fn strip_reasoning(content: &str) -> String {
    match (content.find("<think>"), content.find("</think>")) {
        (Some(start), Some(end)) if start < end => {
            let mut cleaned = String::with_capacity(content.len());
            cleaned.push_str(&content[..start]);
            cleaned.push_str(&content[end + "</think>".len()..]);
            cleaned.trim().to_string()
        }
        _ => content.trim().to_string(),
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}
