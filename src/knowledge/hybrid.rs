//! 하이브리드 검색 - FTS5(BM25) + 벡터 검색 가중 순위 융합
//!
//! 두 하위 검색기를 독립적으로 실행한 뒤 가중 RRF로 병합합니다.
//! 결합 점수 = w_lexical / (k + rank_lexical + 1) + w_dense / (k + rank_dense + 1)
//! 한쪽 결과에 없는 Passage는 그쪽 기여가 0입니다.
//!
//! ref: https://www.elastic.co/blog/hybrid-search-rrf

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use async_trait::async_trait;

use crate::error::{RagError, RagResult};

use super::dense::DenseIndex;
use super::lexical::LexicalIndex;
use super::passage::{cmp_score_desc, Passage, RetrievalResult};

// ============================================================================
// Configuration
// ============================================================================

/// 검색 설정
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// 벡터 검색 후보 수
    pub dense_k: usize,
    /// 키워드 검색 후보 수
    pub lexical_k: usize,
    /// 벡터 검색 가중치
    pub dense_weight: f32,
    /// 키워드 검색 가중치
    pub lexical_weight: f32,
    /// RRF 상수 (높은 순위에 더 많은 가중치)
    pub rank_constant: f32,
    /// 리랭커로 넘길 최대 후보 수
    pub candidate_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_k: 20,
            lexical_k: 20,
            dense_weight: 0.6,
            lexical_weight: 0.4,
            rank_constant: 60.0,
            candidate_limit: 20,
        }
    }
}

impl RetrievalConfig {
    /// 가중치 합이 1.0인지 검증
    pub fn validate(&self) -> RagResult<()> {
        if self.dense_weight < 0.0 || self.lexical_weight < 0.0 {
            return Err(RagError::Validation("retrieval weights must be >= 0".into()));
        }
        if ((self.dense_weight + self.lexical_weight) - 1.0).abs() > 1e-3 {
            return Err(RagError::Validation(format!(
                "retrieval weights must sum to 1.0 (dense={}, lexical={})",
                self.dense_weight, self.lexical_weight
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Retriever Trait
// ============================================================================

/// 검색기 인터페이스
#[async_trait]
pub trait Retriever: Send + Sync {
    /// 관련도 내림차순으로 최대 `limit`개 반환
    async fn retrieve(&self, query: &str, limit: usize) -> RagResult<Vec<RetrievalResult>>;

    /// 검색기 이름
    fn name(&self) -> &'static str;
}

/// 사용 가능한 인덱스가 없을 때의 검색기 (항상 빈 결과)
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    async fn retrieve(&self, _query: &str, _limit: usize) -> RagResult<Vec<RetrievalResult>> {
        Ok(vec![])
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

/// 요청 시점의 검색 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// 벡터 + 키워드 융합
    Hybrid,
    /// 벡터 검색만 (키워드 인덱스 비활성)
    DenseOnly,
    /// 키워드 검색만 (벡터 인덱스 비어 있음)
    LexicalOnly,
    /// 사용 가능한 인덱스 없음
    Empty,
}

impl RetrievalMode {
    pub fn resolve(dense_available: bool, lexical_enabled: bool) -> Self {
        match (dense_available, lexical_enabled) {
            (true, true) => RetrievalMode::Hybrid,
            (true, false) => RetrievalMode::DenseOnly,
            (false, true) => RetrievalMode::LexicalOnly,
            (false, false) => RetrievalMode::Empty,
        }
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 어휘 인덱스는 `resync()` 시점의 밀집 인덱스 스냅샷입니다.
/// 이후 업로드는 다시 `resync()`할 때까지 키워드 검색에 보이지 않습니다.
pub struct HybridRetriever {
    dense: DenseIndex,
    lexical: RwLock<Arc<LexicalIndex>>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// 어휘 인덱스 없이 생성 (`resync()` 전까지 비활성)
    pub fn new(dense: DenseIndex, config: RetrievalConfig) -> RagResult<Self> {
        config.validate()?;
        Ok(Self {
            dense,
            lexical: RwLock::new(Arc::new(LexicalIndex::disabled())),
            config,
        })
    }

    /// 생성 후 즉시 어휘 인덱스 구축
    pub async fn build(dense: DenseIndex, config: RetrievalConfig) -> RagResult<Self> {
        let retriever = Self::new(dense, config)?;
        retriever.resync().await?;
        Ok(retriever)
    }

    /// 밀집 인덱스의 현재 내용으로 어휘 인덱스 재구축
    pub async fn resync(&self) -> RagResult<usize> {
        let snapshot = self.dense.snapshot().await?;
        let index = LexicalIndex::build(snapshot).context("Failed to build lexical index")?;
        let indexed = index.len();

        let mut guard = self
            .lexical
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        *guard = Arc::new(index);

        Ok(indexed)
    }

    /// 어휘 인덱스 활성 여부
    pub fn lexical_enabled(&self) -> bool {
        self.lexical_index()
            .map(|l| l.is_enabled())
            .unwrap_or(false)
    }

    /// 현재 요청에서 사용할 검색 방식
    pub async fn mode(&self) -> RagResult<RetrievalMode> {
        let dense_available = self.dense.count().await? > 0;
        Ok(RetrievalMode::resolve(dense_available, self.lexical_enabled()))
    }

    pub fn dense(&self) -> &DenseIndex {
        &self.dense
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn lexical_index(&self) -> RagResult<Arc<LexicalIndex>> {
        let guard = self
            .lexical
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(Arc::clone(&guard))
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> RagResult<Vec<RetrievalResult>> {
        let lexical = self.lexical_index()?;
        let mode = RetrievalMode::resolve(self.dense.count().await? > 0, lexical.is_enabled());

        let mut results = match mode {
            RetrievalMode::Empty => {
                tracing::error!("No usable index (dense empty, lexical disabled); no context available");
                return EmptyRetriever.retrieve(query, limit).await;
            }
            RetrievalMode::DenseOnly => {
                tracing::info!("Lexical index disabled; using dense retrieval only");
                self.dense.search(query, self.config.dense_k).await?
            }
            RetrievalMode::LexicalOnly => {
                tracing::info!("Dense index empty; using lexical retrieval only");
                lexical.search(query, self.config.lexical_k)?
            }
            RetrievalMode::Hybrid => {
                let (dense_results, lexical_results) = tokio::join!(
                    self.dense.search(query, self.config.dense_k),
                    async { lexical.search(query, self.config.lexical_k) }
                );
                match (dense_results, lexical_results) {
                    (Ok(dense_results), Ok(lexical_results)) => {
                        tracing::debug!(
                            "Hybrid retrieval: {} dense, {} lexical candidates",
                            dense_results.len(),
                            lexical_results.len()
                        );
                        weighted_rank_fusion(&dense_results, &lexical_results, &self.config)
                    }
                    (Err(e), Ok(lexical_results)) => {
                        tracing::warn!("Dense retrieval failed, falling back to lexical only: {}", e);
                        lexical_results
                    }
                    (Ok(dense_results), Err(e)) => {
                        tracing::warn!("Lexical retrieval failed, falling back to dense only: {}", e);
                        dense_results
                    }
                    (Err(dense_err), Err(lexical_err)) => {
                        tracing::error!("Lexical retrieval failed as well: {}", lexical_err);
                        return Err(dense_err);
                    }
                }
            }
        };

        results.truncate(limit);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

// ============================================================================
// Weighted Rank Fusion
// ============================================================================

/// 융합 중간 상태
struct FusedCandidate<'a> {
    passage: &'a Passage,
    score: f32,
    dense_score: Option<f32>,
    first_seen: usize,
}

/// 가중 순위 융합
///
/// 같은 본문을 가진 Passage는 하나로 합칩니다.
/// 동점은 벡터 점수가 높은 쪽, 그다음 먼저 등장한 쪽(벡터 결과 먼저)이 앞섭니다.
pub fn weighted_rank_fusion(
    dense: &[RetrievalResult],
    lexical: &[RetrievalResult],
    config: &RetrievalConfig,
) -> Vec<RetrievalResult> {
    let mut slots: HashMap<&str, FusedCandidate<'_>> = HashMap::new();
    let mut seen = 0usize;

    let sides = [
        (dense, config.dense_weight, true),
        (lexical, config.lexical_weight, false),
    ];

    for (results, weight, is_dense) in sides {
        for (rank, result) in results.iter().enumerate() {
            let contribution = weight * rank_score(rank, config.rank_constant);
            let slot = slots
                .entry(result.passage.content.as_str())
                .or_insert_with(|| {
                    seen += 1;
                    FusedCandidate {
                        passage: &result.passage,
                        score: 0.0,
                        dense_score: None,
                        first_seen: seen,
                    }
                });

            slot.score += contribution;
            if is_dense && slot.dense_score.is_none() {
                slot.dense_score = Some(result.relevance_score);
            }
        }
    }

    let mut fused: Vec<FusedCandidate<'_>> = slots.into_values().collect();
    fused.sort_by(|a, b| {
        cmp_score_desc(a.score, b.score)
            .then_with(|| {
                cmp_score_desc(
                    a.dense_score.unwrap_or(f32::NEG_INFINITY),
                    b.dense_score.unwrap_or(f32::NEG_INFINITY),
                )
            })
            .then(a.first_seen.cmp(&b.first_seen))
    });

    fused
        .into_iter()
        .map(|c| RetrievalResult::new(c.passage.clone(), c.score))
        .collect()
}

/// 정규화 순위 점수: 1 / (k + rank + 1), rank는 0부터
#[inline]
pub fn rank_score(rank: usize, rank_constant: f32) -> f32 {
    1.0 / (rank_constant + rank as f32 + 1.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::knowledge::passage::PassageMetadata;
    use crate::knowledge::vector::MemoryVectorStore;

    /// 단어 해시 버킷 임베딩 (테스트용)
    struct BucketEmbedding;

    #[async_trait]
    impl EmbeddingProvider for BucketEmbedding {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut v = vec![0.0f32; 32];
            for word in text.split_whitespace() {
                let bucket = word
                    .to_lowercase()
                    .bytes()
                    .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                    % 32;
                v[bucket] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            32
        }

        fn name(&self) -> &str {
            "bucket"
        }
    }

    /// `down`이 켜지면 임베딩 호출이 실패
    struct SwitchEmbedding {
        down: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for SwitchEmbedding {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            if self.down.load(std::sync::atomic::Ordering::SeqCst) {
                anyhow::bail!("embedding API unreachable");
            }
            BucketEmbedding.embed(text).await
        }

        fn dimension(&self) -> usize {
            32
        }

        fn name(&self) -> &str {
            "switch"
        }
    }

    fn result(content: &str, score: f32) -> RetrievalResult {
        RetrievalResult::new(
            Passage::new(
                content,
                PassageMetadata {
                    source_id: "s".to_string(),
                    chunk_index: 0,
                    title: None,
                },
            ),
            score,
        )
    }

    fn dense_index() -> DenseIndex {
        DenseIndex::new(Arc::new(BucketEmbedding), Arc::new(MemoryVectorStore::new()))
    }

    fn passages(texts: &[&str]) -> Vec<Passage> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Passage::new(
                    *t,
                    PassageMetadata {
                        source_id: "ata".to_string(),
                        chunk_index: i as i32,
                        title: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_rank_score() {
        // 1위: 1 / (60 + 0 + 1) = 1/61 ≈ 0.0164
        assert!((rank_score(0, 60.0) - 0.0164).abs() < 0.001);
        // 5위: 1 / (60 + 4 + 1) = 1/65 ≈ 0.0154
        assert!((rank_score(4, 60.0) - 0.0154).abs() < 0.001);
        assert!(rank_score(0, 60.0) > rank_score(4, 60.0));
    }

    #[test]
    fn test_config_validation() {
        assert!(RetrievalConfig::default().validate().is_ok());

        let bad = RetrievalConfig {
            dense_weight: 0.7,
            lexical_weight: 0.7,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(RagError::Validation(_))));
    }

    #[test]
    fn test_fusion_rewards_passages_found_by_both() {
        let config = RetrievalConfig::default();
        let dense = vec![result("a", 0.9), result("b", 0.8)];
        let lexical = vec![result("b", 5.0), result("c", 4.0)];

        let fused = weighted_rank_fusion(&dense, &lexical, &config);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].passage.content, "b");
        let expected_b = 0.6 * rank_score(1, 60.0) + 0.4 * rank_score(0, 60.0);
        assert!((fused[0].relevance_score - expected_b).abs() < 1e-6);

        for pair in fused.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_fusion_weights_favor_dense() {
        let config = RetrievalConfig::default();
        let dense = vec![result("dense-top", 0.9)];
        let lexical = vec![result("lexical-top", 9.0)];

        let fused = weighted_rank_fusion(&dense, &lexical, &config);
        assert_eq!(fused[0].passage.content, "dense-top");
        assert_eq!(fused[1].passage.content, "lexical-top");
    }

    #[test]
    fn test_fusion_tie_broken_by_dense_score_then_first_seen() {
        let config = RetrievalConfig {
            dense_weight: 0.5,
            lexical_weight: 0.5,
            ..Default::default()
        };

        // x: dense rank 0, y: lexical rank 0 → 동점, x만 벡터 점수 있음
        let fused = weighted_rank_fusion(&[result("x", 0.1)], &[result("y", 3.0)], &config);
        assert_eq!(fused[0].passage.content, "x");

        // 양쪽 모두 벡터 점수 없음 → 먼저 등장한 쪽
        let fused = weighted_rank_fusion(&[], &[result("p", 2.0), result("q", 1.0)], &config);
        assert_eq!(fused[0].passage.content, "p");
    }

    #[tokio::test]
    async fn test_empty_mode_returns_nothing() {
        let retriever = HybridRetriever::build(dense_index(), RetrievalConfig::default())
            .await
            .unwrap();

        assert_eq!(retriever.mode().await.unwrap(), RetrievalMode::Empty);
        assert!(!retriever.lexical_enabled());
        assert!(retriever.retrieve("qualquer pergunta", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dense_only_before_resync() {
        let dense = dense_index();
        dense
            .add(&passages(&["bolsas de monitoria", "eleição do coordenador"]))
            .await
            .unwrap();

        let retriever = HybridRetriever::new(dense, RetrievalConfig::default()).unwrap();
        assert_eq!(retriever.mode().await.unwrap(), RetrievalMode::DenseOnly);

        let results = retriever.retrieve("eleição do coordenador", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.content, "eleição do coordenador");
    }

    #[tokio::test]
    async fn test_hybrid_after_resync_respects_limit() {
        let dense = dense_index();
        dense
            .add(&passages(&[
                "o conselho aprovou o calendário",
                "bolsas de monitoria do departamento",
                "eleição do coordenador do curso",
                "relatório financeiro do semestre",
            ]))
            .await
            .unwrap();

        let retriever = HybridRetriever::build(dense, RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(retriever.mode().await.unwrap(), RetrievalMode::Hybrid);

        let results = retriever.retrieve("coordenador do curso", 2).await.unwrap();
        assert!(results.len() <= 2);
        assert_eq!(results[0].passage.content, "eleição do coordenador do curso");
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[tokio::test]
    async fn test_lexical_snapshot_is_stale_until_resync() {
        let dense = dense_index();
        dense.add(&passages(&["ata antiga"])).await.unwrap();
        let retriever = HybridRetriever::build(dense, RetrievalConfig::default())
            .await
            .unwrap();

        retriever
            .dense()
            .add(&passages(&["ata nova sobre orçamento"]))
            .await
            .unwrap();

        let lexical = retriever.lexical_index().unwrap();
        assert_eq!(lexical.len(), 1);

        assert_eq!(retriever.resync().await.unwrap(), 2);
        assert_eq!(retriever.lexical_index().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dense_failure_falls_back_to_lexical() {
        let embedder = Arc::new(SwitchEmbedding {
            down: std::sync::atomic::AtomicBool::new(false),
        });
        let dense = DenseIndex::new(embedder.clone(), Arc::new(MemoryVectorStore::new()));
        dense
            .add(&passages(&[
                "bolsas de monitoria do departamento",
                "eleição do coordenador do curso",
            ]))
            .await
            .unwrap();

        let retriever = HybridRetriever::build(dense, RetrievalConfig::default())
            .await
            .unwrap();
        embedder.down.store(true, std::sync::atomic::Ordering::SeqCst);

        assert_eq!(retriever.mode().await.unwrap(), RetrievalMode::Hybrid);
        let results = retriever.retrieve("coordenador", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.content, "eleição do coordenador do curso");
    }

    #[tokio::test]
    async fn test_dense_failure_without_lexical_is_an_error() {
        let embedder = Arc::new(SwitchEmbedding {
            down: std::sync::atomic::AtomicBool::new(false),
        });
        let dense = DenseIndex::new(embedder.clone(), Arc::new(MemoryVectorStore::new()));
        dense.add(&passages(&["ata do colegiado"])).await.unwrap();

        let retriever = HybridRetriever::new(dense, RetrievalConfig::default()).unwrap();
        embedder.down.store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(retriever.retrieve("colegiado", 5).await.is_err());
    }
}
