//! Reranker - cross-encoder 기반 재순위화
//!
//! 하이브리드 검색 후보를 (질문, Passage) 쌍 단위로 다시 채점해
//! 상위 `top_n`개만 남깁니다.
//!
//! `cross-encoder` feature가 켜져 있으면 fastembed의 `TextRerank`를 사용합니다.
//! 모델 초기화에 실패하면 파이프라인은 Reranker 없이 동작합니다.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RagResult;
use crate::knowledge::RetrievalResult;

/// 기본 재순위화 결과 수
pub const DEFAULT_TOP_N: usize = 5;

/// 재순위화 설정
#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub top_n: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

// ============================================================================
// Relevance Model
// ============================================================================

/// 질문-문서 쌍 관련도 모델
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// 각 문서의 관련도 점수 (입력 순서와 같은 길이)
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}

/// fastembed cross-encoder (BGE reranker)
#[cfg(feature = "cross-encoder")]
pub struct FastEmbedRelevance {
    model: Arc<std::sync::Mutex<fastembed::TextRerank>>,
}

#[cfg(feature = "cross-encoder")]
impl FastEmbedRelevance {
    /// 모델 로드 (최초 실행 시 다운로드)
    pub async fn load() -> Result<Self> {
        let model = tokio::task::spawn_blocking(|| {
            fastembed::TextRerank::try_new(fastembed::RerankInitOptions::new(
                fastembed::RerankerModel::BGERerankerBase,
            ))
            .map_err(|e| anyhow::anyhow!("Failed to load cross-encoder: {}", e))
        })
        .await??;

        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "cross-encoder")]
#[async_trait]
impl RelevanceModel for FastEmbedRelevance {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = documents.to_vec();

        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = documents.iter().map(String::as_str).collect();
            let mut guard = model
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
            let ranked = guard
                .rerank(query.as_str(), &refs, false, None)
                .map_err(|e| anyhow::anyhow!("Cross-encoder failed: {}", e))?;

            // 결과는 점수순이므로 입력 순서로 되돌림
            let mut scores = vec![f32::NEG_INFINITY; refs.len()];
            for r in ranked {
                if let Some(slot) = scores.get_mut(r.index) {
                    *slot = r.score;
                }
            }
            Ok(scores)
        })
        .await?
    }

    fn name(&self) -> &str {
        "bge-reranker-base"
    }
}

/// 설정된 cross-encoder 초기화 시도
///
/// 실패하거나 feature가 꺼져 있으면 None (재순위화 생략).
pub async fn try_init_relevance_model() -> Option<Arc<dyn RelevanceModel>> {
    #[cfg(feature = "cross-encoder")]
    {
        match FastEmbedRelevance::load().await {
            Ok(model) => {
                tracing::info!("Cross-encoder reranker loaded: {}", model.name());
                Some(Arc::new(model) as Arc<dyn RelevanceModel>)
            }
            Err(e) => {
                tracing::warn!("Cross-encoder initialization failed: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "cross-encoder"))]
    {
        tracing::warn!("Built without cross-encoder support; reranking disabled");
        None
    }
}

// ============================================================================
// Reranker
// ============================================================================

/// 재순위화기
#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    top_n: usize,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, config: &RerankConfig) -> Self {
        Self {
            model,
            top_n: config.top_n,
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// 후보 재순위화 (상위 `top_n`개, 점수 내림차순)
    ///
    /// 채점 중 오류가 나면 기존 순서의 상위 `top_n`개를 사용합니다.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> RagResult<Vec<RetrievalResult>> {
        if candidates.is_empty() || self.top_n == 0 {
            return Ok(vec![]);
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|c| c.passage.content.clone())
            .collect();

        let scores = match self.model.score(query, &documents).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                tracing::warn!(
                    "Relevance model returned {} scores for {} candidates; keeping retrieval order",
                    scores.len(),
                    candidates.len()
                );
                return Ok(keep_order(candidates, self.top_n));
            }
            Err(e) => {
                tracing::warn!("Reranking failed, keeping retrieval order: {}", e);
                return Ok(keep_order(candidates, self.top_n));
            }
        };

        let mut scored: Vec<(usize, RetrievalResult)> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(i, (mut candidate, score))| {
                candidate.relevance_score = score;
                (i, candidate)
            })
            .collect();

        // 동점은 검색 순서 유지
        scored.sort_by(|(ia, a), (ib, b)| {
            crate::knowledge::cmp_score_desc(a.relevance_score, b.relevance_score)
                .then(ia.cmp(ib))
        });
        scored.truncate(self.top_n);

        tracing::debug!("Reranked to {} passages with {}", scored.len(), self.model.name());
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }
}

fn keep_order(mut candidates: Vec<RetrievalResult>, top_n: usize) -> Vec<RetrievalResult> {
    candidates.truncate(top_n);
    candidates
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Passage, PassageMetadata};

    /// 질문 단어가 문서에 몇 개 나오는지로 채점
    struct OverlapRelevance;

    #[async_trait]
    impl RelevanceModel for OverlapRelevance {
        async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
            let terms: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
            Ok(documents
                .iter()
                .map(|d| {
                    let lower = d.to_lowercase();
                    terms.iter().filter(|t| lower.contains(t.as_str())).count() as f32
                })
                .collect())
        }

        fn name(&self) -> &str {
            "overlap"
        }
    }

    struct BrokenRelevance;

    #[async_trait]
    impl RelevanceModel for BrokenRelevance {
        async fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>> {
            anyhow::bail!("model crashed")
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn candidates(texts: &[&str]) -> Vec<RetrievalResult> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                RetrievalResult::new(
                    Passage::new(
                        *t,
                        PassageMetadata {
                            source_id: "ata".to_string(),
                            chunk_index: i as i32,
                            title: None,
                        },
                    ),
                    1.0 - i as f32 * 0.1,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rerank_orders_by_relevance_and_truncates() {
        let reranker = Reranker::new(Arc::new(OverlapRelevance), &RerankConfig { top_n: 2 });
        let input = candidates(&[
            "pauta geral",
            "eleição do coordenador",
            "coordenador eleito por unanimidade na eleição",
            "bolsas",
        ]);
        let contents: Vec<String> = input.iter().map(|c| c.passage.content.clone()).collect();

        let output = reranker.rerank("eleição coordenador eleito", input).await.unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(
            output[0].passage.content,
            "coordenador eleito por unanimidade na eleição"
        );
        assert!(output[0].relevance_score >= output[1].relevance_score);
        assert!(output.iter().all(|o| contents.contains(&o.passage.content)));
    }

    #[tokio::test]
    async fn test_rerank_fewer_candidates_than_top_n() {
        let reranker = Reranker::new(Arc::new(OverlapRelevance), &RerankConfig::default());
        let output = reranker.rerank("pauta", candidates(&["a", "pauta"])).await.unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].passage.content, "pauta");

        assert!(reranker.rerank("pauta", vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rerank_failure_keeps_retrieval_order() {
        let reranker = Reranker::new(Arc::new(BrokenRelevance), &RerankConfig { top_n: 2 });
        let output = reranker
            .rerank("q", candidates(&["first", "second", "third"]))
            .await
            .unwrap();
        let order: Vec<&str> = output.iter().map(|o| o.passage.content.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[cfg(not(feature = "cross-encoder"))]
    #[tokio::test]
    async fn test_init_without_feature_is_none() {
        assert!(try_init_relevance_model().await.is_none());
    }

    #[test]
    #[cfg_attr(not(feature = "cross-encoder"), ignore = "built with --no-default-features")]
    fn test_cross_encoder_is_a_default_feature() {
        assert!(cfg!(feature = "cross-encoder"));
    }
}
