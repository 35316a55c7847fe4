//! Service 모듈 - 업로드/채팅 워크플로가 호출하는 진입점
//!
//! 서비스 객체는 전역이 아니라 호출 측(CLI)에서 명시적으로 조립합니다.
//! 조립 순서: 임베딩/벡터 저장소 → DenseIndex → HybridRetriever → 서비스

mod ata;
mod chat;
pub mod eval;

pub use ata::{AtaService, IngestReport, SourceMetadata};
pub use chat::{AnswerRecord, ChatService, ChatStatus};
pub use eval::{generate_dataset, load_cases, write_dataset, EvalCase, EvalReport, EvalSample};
