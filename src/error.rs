//! 에러 타입 - RAG 파이프라인 에러 분류
//!
//! 호출자(업로드/채팅 워크플로)가 상태 코드를 고를 수 있도록
//! 에러를 네 가지 범주로 나눕니다.
//! - Validation: 잘못된 입력 (400)
//! - Configuration: 모델/자격증명 선택 오류 (400)
//! - BackendUnavailable: 로컬/원격 서비스 다운 (503)
//! - Ingestion: 문서 처리 실패 (400)

use thiserror::Error;

/// 파이프라인 결과 타입
pub type RagResult<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 입력 형식 오류 (빈 질문 등)
    #[error("invalid input: {0}")]
    Validation(String),

    /// 필터링 후 내용이 없는 문서
    #[error("document has no readable content")]
    EmptyDocument,

    /// 분할 결과 청크가 하나도 없음
    #[error("splitting produced no chunks")]
    NoChunksProduced,

    /// 알 수 없는 모델 식별자
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// 필요한 API 키가 환경변수에 없음
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// 백엔드 연결 불가 (connection refused 등)
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 문서 수집 실패 (임베딩 0개 등)
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// 분류되지 않은 내부 오류 (표시 문자열에 원인 체인 포함)
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// 에러 범주
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    BackendUnavailable,
    Ingestion,
    Internal,
}

impl RagError {
    /// 에러 범주 반환
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Validation(_) => ErrorKind::Validation,
            RagError::UnsupportedModel(_) | RagError::MissingCredential(_) => {
                ErrorKind::Configuration
            }
            RagError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            RagError::EmptyDocument | RagError::NoChunksProduced | RagError::Ingestion(_) => {
                ErrorKind::Ingestion
            }
            RagError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP 상태 코드 대응값
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::Ingestion => 400,
            ErrorKind::BackendUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// anyhow 에러 변환 (안에 RagError가 있으면 그 분류를 유지)
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(rag) => rag,
            Err(err) => RagError::Internal(err),
        }
    }

    /// 호출자에게 보여줄 메시지 (내부 오류는 상세 내용 숨김)
    pub fn public_message(&self) -> String {
        match self {
            RagError::Internal(_) => "unexpected internal error".to_string(),
            other => other.to_string(),
        }
    }
}
