//! Dense Index - 임베딩 기반 의미 검색 인덱스
//!
//! 임베딩 프로바이더와 벡터 저장소를 묶어 Passage 단위 API를 제공합니다.

use std::sync::Arc;

use anyhow::Context;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};

use super::passage::{Passage, RetrievalResult};
use super::vector::{VectorEntry, VectorStore};

/// 밀집(벡터) 인덱스
#[derive(Clone)]
pub struct DenseIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl DenseIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Passage 임베딩 후 저장
    ///
    /// 반환값은 실제로 저장된 벡터 수입니다.
    pub async fn add(&self, passages: &[Passage]) -> RagResult<usize> {
        if passages.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| RagError::from_anyhow(e.context("Failed to embed passages")))?;

        let entries: Vec<VectorEntry> = passages
            .iter()
            .zip(embeddings)
            .filter(|(_, embedding)| !embedding.is_empty())
            .map(|(passage, embedding)| VectorEntry {
                passage: passage.clone(),
                embedding,
            })
            .collect();

        let stored = self
            .store
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        tracing::debug!(
            "Stored {} of {} passages with {}",
            stored,
            passages.len(),
            self.embedder.name()
        );
        Ok(stored)
    }

    /// 유사도 검색 (인덱스가 비어 있으면 빈 결과)
    pub async fn search(&self, query: &str, k: usize) -> RagResult<Vec<RetrievalResult>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::from_anyhow(e.context("Failed to embed query")))?;

        let mut results = self
            .store
            .search(&query_embedding, k)
            .await
            .context("Vector search failed")?;
        results.truncate(k);
        Ok(results)
    }

    /// 저장된 Passage 수
    pub async fn count(&self) -> RagResult<usize> {
        Ok(self.store.count().await?)
    }

    /// 현재 저장된 모든 Passage (어휘 인덱스 재구축용)
    pub async fn snapshot(&self) -> RagResult<Vec<Passage>> {
        Ok(self.store.all_passages().await?)
    }

    /// 특정 문서의 벡터 삭제 (수집 실패 시 정리용)
    pub async fn delete_source(&self, source_id: &str) -> RagResult<usize> {
        Ok(self.store.delete_by_source(source_id).await?)
    }

    /// 임베딩 모델 이름
    pub fn embedding_model(&self) -> &str {
        self.embedder.name()
    }
}
