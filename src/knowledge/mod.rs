//! Knowledge 모듈 - 회의록 하이브리드 검색 저장소
//!
//! - Chunker: 항목 번호 인식 재귀 텍스트 분할
//! - Dense: 임베딩 + 벡터 저장소 (LanceDB / 메모리)
//! - Lexical: 메모리 SQLite FTS5 BM25 검색
//! - Hybrid: 가중 RRF로 두 검색 결과 통합
//! - Store: 회의록/대화/메시지 관계형 저장소

mod chunker;
mod dense;
mod hybrid;
mod lance;
mod lexical;
mod passage;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, default_separators, recursive_chunker, ChunkConfig, Chunker, RecursiveChunker,
    EXPLICIT_ITEM_SEPARATOR, NUMBERED_ITEM_SEPARATOR, ROMAN_ITEM_SEPARATOR,
};
pub use dense::DenseIndex;
pub use hybrid::{
    rank_score, weighted_rank_fusion, EmptyRetriever, HybridRetriever, RetrievalConfig,
    RetrievalMode, Retriever,
};
pub use lance::LanceVectorStore;
pub use lexical::LexicalIndex;
pub use passage::{Passage, PassageMetadata, RetrievalResult};
pub(crate) use passage::cmp_score_desc;
pub use store::{
    conversation_title, get_data_dir, Ata, Conversation, Message, NewAta, NewExchange,
    RecordStore, StoreStats, DEFAULT_CONVERSATION_TITLE, TITLE_MAX_CHARS,
};
pub use vector::{cosine_similarity, MemoryVectorStore, VectorEntry, VectorStore};
