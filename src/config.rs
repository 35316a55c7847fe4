//! 설정 - 파이프라인 전체 조정값
//!
//! 기본값은 `Default`에 있고, `from_env()`가 환경변수로 덮어씁니다.
//! 잘못된 값은 경고 후 무시합니다.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::RagResult;
use crate::knowledge::{get_data_dir, ChunkConfig, RetrievalConfig};
use crate::llm::ModelConfig;
use crate::rag::RerankConfig;

/// 파이프라인 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub models: ModelConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            models: ModelConfig::default(),
        }
    }
}

impl RagConfig {
    /// 기본값 + 환경변수
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// 키 조회 함수로 덮어쓰기
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("ATA_RAG_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            self.models.ollama_host = host;
        }

        override_parsed(&lookup, "ATA_RAG_DENSE_WEIGHT", &mut self.retrieval.dense_weight);
        override_parsed(&lookup, "ATA_RAG_LEXICAL_WEIGHT", &mut self.retrieval.lexical_weight);
        override_parsed(&lookup, "ATA_RAG_TOP_N", &mut self.rerank.top_n);
        override_parsed(&lookup, "ATA_RAG_CHUNK_SIZE", &mut self.chunk.target_size);
        override_parsed(&lookup, "ATA_RAG_CHUNK_OVERLAP", &mut self.chunk.overlap);
        override_parsed(
            &lookup,
            "ATA_RAG_REQUEST_TIMEOUT",
            &mut self.models.request_timeout_secs,
        );
    }

    /// 조합 검증
    pub fn validate(&self) -> RagResult<()> {
        self.chunk.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// 업로드 파일 보관 디렉토리
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// LanceDB 디렉토리
    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunk.target_size, 800);
        assert_eq!(config.chunk.overlap, 200);
        assert_eq!(config.retrieval.dense_k, 20);
        assert_eq!(config.retrieval.lexical_k, 20);
        assert!((config.retrieval.dense_weight - 0.6).abs() < f32::EPSILON);
        assert!((config.retrieval.lexical_weight - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.rerank.top_n, 5);
        assert!(config.data_dir.ends_with(".ata-rag"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = RagConfig::default();
        config.apply_overrides(lookup_from(&[
            ("ATA_RAG_DATA_DIR", "/tmp/ata"),
            ("OLLAMA_HOST", "http://gpu:11434"),
            ("ATA_RAG_DENSE_WEIGHT", "0.5"),
            ("ATA_RAG_LEXICAL_WEIGHT", "0.5"),
            ("ATA_RAG_TOP_N", "3"),
            ("ATA_RAG_CHUNK_SIZE", "400"),
            ("ATA_RAG_CHUNK_OVERLAP", "50"),
            ("ATA_RAG_REQUEST_TIMEOUT", "30"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ata"));
        assert_eq!(config.models.ollama_host, "http://gpu:11434");
        assert!((config.retrieval.dense_weight - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.rerank.top_n, 3);
        assert_eq!(config.chunk.target_size, 400);
        assert_eq!(config.chunk.overlap, 50);
        assert_eq!(config.models.request_timeout_secs, 30);
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/ata/uploads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_ignored() {
        let mut config = RagConfig::default();
        config.apply_overrides(lookup_from(&[("ATA_RAG_TOP_N", "cinco"), ("ATA_RAG_DATA_DIR", "  ")]));
        assert_eq!(config.rerank.top_n, 5);
        assert!(config.data_dir.ends_with(".ata-rag"));
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = RagConfig::default();
        config.apply_overrides(lookup_from(&[("ATA_RAG_DENSE_WEIGHT", "0.9")]));
        assert!(config.validate().is_err());
    }
}
