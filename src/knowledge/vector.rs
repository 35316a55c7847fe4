//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 밀집 인덱스의 저장 계층입니다. 영속 구현은 `LanceVectorStore`,
//! 프로세스 내 구현은 `MemoryVectorStore` (테스트/임시 인덱스용).

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::passage::{cmp_score_desc, Passage, RetrievalResult};

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 본문 + 메타데이터
    pub passage: Passage,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입 (반환 전에 쓰기가 완료되어야 함)
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 유사도 내림차순 검색 (비어 있으면 빈 결과)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievalResult>>;

    /// source_id에 속한 벡터 삭제
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 모든 Passage (어휘 인덱스 재구축용 스냅샷)
    async fn all_passages(&self) -> Result<Vec<Passage>>;
}

// ============================================================================
// MemoryVectorStore
// ============================================================================

/// 메모리 벡터 저장소 (전수 코사인 검색)
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut guard = self.entries.write().await;
        guard.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievalResult>> {
        let guard = self.entries.read().await;

        let mut results: Vec<RetrievalResult> = guard
            .iter()
            .map(|e| {
                RetrievalResult::new(
                    e.passage.clone(),
                    cosine_similarity(query_embedding, &e.embedding),
                )
            })
            .collect();

        results.sort_by(|a, b| cmp_score_desc(a.relevance_score, b.relevance_score));
        results.truncate(limit);
        Ok(results)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|e| e.passage.metadata.source_id != source_id);
        Ok(before - guard.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn all_passages(&self) -> Result<Vec<Passage>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|e| e.passage.clone())
            .collect())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
