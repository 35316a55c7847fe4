//! LLM 모듈 - 모델 식별자 해석 및 생성 백엔드
//!
//! 모델 식별자는 두 종류입니다.
//! - `ollama/<name>`: 로컬 Ollama 서버
//! - 별칭 테이블에 있는 이름: Google Gemini API
//!
//! 그 외 식별자는 `UnsupportedModel`로 거부됩니다.

mod gemini;
mod ollama;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::error::{RagError, RagResult};

pub use gemini::{gemini_api_key, GeminiModel, GEMINI_KEY_VARS};
pub use ollama::{OllamaModel, DEFAULT_OLLAMA_HOST};

/// 기본 모델 식별자
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// 로컬 기본 모델 (`ollama/` 뒤 이름이 비어 있을 때)
pub const DEFAULT_LOCAL_MODEL: &str = "deepseek-r1:1.5b";

/// 생성 요청 기본 타임아웃 (로컬 추론형 모델 기준)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// 질의 확장용 모델 (API 이름)
pub const AUGMENT_MODEL: &str = "gemini-1.5-flash-latest";

// ============================================================================
// Configuration
// ============================================================================

/// 모델 설정
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 로컬 백엔드 접두사
    pub local_prefix: String,
    /// 사용자 식별자 → Gemini API 모델 이름
    pub hosted_aliases: Vec<(String, String)>,
    /// 질의 확장 모델
    pub augment_model: String,
    /// 질의 확장 temperature
    pub augment_temperature: f32,
    /// 답변 생성 temperature
    pub answer_temperature: f32,
    /// Ollama 서버 주소
    pub ollama_host: String,
    /// 생성 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            local_prefix: "ollama/".to_string(),
            hosted_aliases: vec![
                ("gemma-3".to_string(), "gemma-3-27b-it".to_string()),
                ("gemini-1.5-pro".to_string(), "gemini-1.5-pro-latest".to_string()),
                ("gemini-1.5-flash".to_string(), "gemini-1.5-flash-latest".to_string()),
            ],
            augment_model: AUGMENT_MODEL.to_string(),
            augment_temperature: 0.3,
            answer_temperature: 0.0,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Model Resolution
// ============================================================================

/// 해석된 생성 백엔드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// 로컬 Ollama 모델
    Local { model: String },
    /// Gemini API 모델 (API 이름)
    Hosted { model: String },
}

impl ModelBackend {
    pub fn model(&self) -> &str {
        match self {
            ModelBackend::Local { model } | ModelBackend::Hosted { model } => model,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelBackend::Local { .. } => "ollama",
            ModelBackend::Hosted { .. } => "gemini",
        }
    }
}

/// 모델 식별자 해석기
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    local_prefix: String,
    aliases: Vec<(String, String)>,
}

impl ModelRegistry {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            local_prefix: config.local_prefix.clone(),
            aliases: config.hosted_aliases.clone(),
        }
    }

    /// 식별자 → 백엔드
    ///
    /// 인덱스나 네트워크에 접근하지 않는 순수 함수입니다.
    pub fn resolve(&self, identifier: &str) -> RagResult<ModelBackend> {
        if let Some(name) = identifier.strip_prefix(self.local_prefix.as_str()) {
            let name = name.trim();
            let model = if name.is_empty() { DEFAULT_LOCAL_MODEL } else { name };
            return Ok(ModelBackend::Local {
                model: model.to_string(),
            });
        }

        self.aliases
            .iter()
            .find(|(alias, _)| alias == identifier)
            .map(|(_, api_name)| ModelBackend::Hosted {
                model: api_name.clone(),
            })
            .ok_or_else(|| RagError::UnsupportedModel(identifier.to_string()))
    }

    /// 선택 가능한 호스팅 모델 식별자
    pub fn known_identifiers(&self) -> Vec<String> {
        self.aliases.iter().map(|(alias, _)| alias.clone()).collect()
    }

    /// 별칭 테이블 (식별자, API 이름)
    pub fn aliases(&self) -> &[(String, String)] {
        &self.aliases
    }

    pub fn local_prefix(&self) -> &str {
        &self.local_prefix
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(&ModelConfig::default())
    }
}

// ============================================================================
// Language Model Traits
// ============================================================================

/// 텍스트 생성 모델
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트 → 생성 텍스트
    async fn generate(&self, prompt: &str) -> RagResult<String>;

    /// 모델 이름
    fn model_name(&self) -> &str;
}

/// 백엔드 → 모델 핸들
///
/// 호스팅 백엔드는 자격증명이 없으면 `MissingCredential`을 반환합니다.
pub trait ModelProvider: Send + Sync {
    fn connect(&self, backend: &ModelBackend, temperature: f32) -> RagResult<Arc<dyn LanguageModel>>;
}

/// HTTP 기반 기본 프로바이더 (Ollama + Gemini)
pub struct HttpModelProvider {
    client: reqwest::Client,
    ollama_host: String,
    gemini_key: Option<String>,
}

impl HttpModelProvider {
    /// 타임아웃이 걸린 HTTP 클라이언트로 생성
    pub fn new(
        ollama_host: impl Into<String>,
        gemini_key: Option<String>,
        timeout: Duration,
    ) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            ollama_host: ollama_host.into(),
            gemini_key,
        })
    }

    /// 환경변수에서 Gemini 키 읽기
    pub fn from_env(config: &ModelConfig) -> RagResult<Self> {
        Self::new(
            config.ollama_host.clone(),
            gemini_api_key(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

impl ModelProvider for HttpModelProvider {
    fn connect(&self, backend: &ModelBackend, temperature: f32) -> RagResult<Arc<dyn LanguageModel>> {
        match backend {
            ModelBackend::Local { model } => {
                tracing::info!("Using Ollama model: {}", model);
                Ok(Arc::new(OllamaModel::new(
                    self.client.clone(),
                    &self.ollama_host,
                    model,
                    temperature,
                )))
            }
            ModelBackend::Hosted { model } => {
                let api_key = self
                    .gemini_key
                    .clone()
                    .ok_or(RagError::MissingCredential(GEMINI_KEY_VARS[0]))?;
                tracing::info!("Using Gemini model: {}", model);
                Ok(Arc::new(GeminiModel::new(
                    self.client.clone(),
                    api_key,
                    model,
                    temperature,
                )))
            }
        }
    }
}

/// reqwest 에러 분류 (연결 실패 → BackendUnavailable)
pub(crate) fn classify_request_error(backend: &str, err: reqwest::Error) -> RagError {
    if err.is_connect() || err.is_timeout() {
        RagError::BackendUnavailable(format!("{} not reachable: {}", backend, err))
    } else {
        RagError::Internal(anyhow::Error::new(err).context(format!("{} request failed", backend)))
    }
}

// ============================================================================
// Tests
// ============================================================================
