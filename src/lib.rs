//! ata-rag - 회의록(ata) 질의응답 하이브리드 RAG
//!
//! LanceDB 벡터 검색 + SQLite FTS5 키워드 검색을 가중 RRF로 결합하고,
//! cross-encoder 재순위화와 질의 확장을 거쳐 근거 기반 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod service;

// Re-exports
pub use config::RagConfig;
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, OpenAiEmbedding};
pub use error::{ErrorKind, RagError, RagResult};
pub use knowledge::{
    default_chunker, ChunkConfig, Chunker, DenseIndex, EmptyRetriever, HybridRetriever,
    LanceVectorStore, LexicalIndex, MemoryVectorStore, Passage, PassageMetadata, RecordStore,
    RetrievalConfig, RetrievalResult, Retriever, VectorStore,
};
pub use llm::{LanguageModel, ModelBackend, ModelProvider, ModelRegistry};
pub use rag::{AnswerGenerator, QueryAugmenter, RelevanceModel, RerankConfig, Reranker};
pub use service::{AnswerRecord, AtaService, ChatService, SourceMetadata};
