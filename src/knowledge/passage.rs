//! Passage 타입 - 검색 단위
//!
//! 문서를 분할한 청크이며, 밀집(벡터) 인덱스와 어휘(FTS5) 인덱스가
//! 각자 독립된 사본을 소유합니다.

use serde::{Deserialize, Serialize};

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// 원본 문서 식별자 (수집 시 생성된 UUID)
    pub source_id: String,
    /// 문서 내 청크 순서 (0-based)
    pub chunk_index: i32,
    /// 원본 문서 제목
    pub title: Option<String>,
}

/// 검색 단위 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn new(content: impl Into<String>, metadata: PassageMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// 검색 결과 (점수 내림차순이 계약)
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub passage: Passage,
    pub relevance_score: f32,
}

impl RetrievalResult {
    pub fn new(passage: Passage, relevance_score: f32) -> Self {
        Self {
            passage,
            relevance_score,
        }
    }
}

/// 점수 내림차순 비교 (NaN은 동일 취급)
pub(crate) fn cmp_score_desc(a: f32, b: f32) -> std::cmp::Ordering {
    b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
}
