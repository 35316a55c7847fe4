//! RAG 모듈 - 검색 이후 단계
//!
//! - Rerank: cross-encoder 재순위화 (선택)
//! - Augment: 검색용 질문 확장 (선택)
//! - Generator: 근거 기반 단일 호출 답변 생성

mod augment;
mod generator;
mod rerank;

pub use augment::QueryAugmenter;
pub use generator::{AnswerGenerator, GeneratedAnswer, FALLBACK_ANSWER};
pub use rerank::{try_init_relevance_model, RelevanceModel, RerankConfig, Reranker, DEFAULT_TOP_N};

#[cfg(feature = "cross-encoder")]
pub use rerank::FastEmbedRelevance;
