//! Ata Service - 회의록 수집 (분할 → 임베딩 → 저장)
//!
//! 업로드 하나는 전부 성공하거나 전부 실패합니다.
//! - 저장된 벡터가 0개면 레코드를 만들지 않고 업로드 파일을 지웁니다.
//! - 레코드 저장이 실패하면 해당 문서의 벡터를 지웁니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{RagError, RagResult};
use crate::extractor::extract_text;
use crate::knowledge::{Ata, Chunker, DenseIndex, NewAta, RecordStore};

/// 문서 출처 정보
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    pub title: Option<String>,
    /// 업로드 파일 경로 (텍스트 직접 입력이면 None)
    pub raw_path: Option<PathBuf>,
}

/// 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub ata_id: i64,
    pub source_id: String,
    pub title: String,
    /// 저장된 Passage 수
    pub passage_count: usize,
}

/// 회의록 수집 서비스
pub struct AtaService {
    chunker: Box<dyn Chunker>,
    dense: DenseIndex,
    records: Arc<RecordStore>,
    uploads_dir: PathBuf,
}

impl AtaService {
    pub fn new(
        chunker: Box<dyn Chunker>,
        dense: DenseIndex,
        records: Arc<RecordStore>,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            chunker,
            dense,
            records,
            uploads_dir,
        }
    }

    /// 추출된 텍스트 수집
    pub async fn ingest_document(&self, text: &str, source: SourceMetadata) -> RagResult<IngestReport> {
        let source_id = Uuid::new_v4().to_string();
        let title = source
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title(source.raw_path.as_deref()));

        let result = self.ingest_inner(text, &source_id, &title, &source).await;

        if result.is_err() {
            if let Some(path) = source.raw_path.as_deref() {
                self.discard_upload(path);
            }
        }
        result
    }

    async fn ingest_inner(
        &self,
        text: &str,
        source_id: &str,
        title: &str,
        source: &SourceMetadata,
    ) -> RagResult<IngestReport> {
        let passages = self.chunker.chunk_document(text, source_id, Some(title))?;
        tracing::info!(
            "Split '{}' into {} passages ({})",
            title,
            passages.len(),
            self.chunker.name()
        );

        let stored = self.dense.add(&passages).await?;
        if stored == 0 {
            return Err(RagError::Ingestion(format!(
                "no embeddings were stored for '{}'",
                title
            )));
        }

        let record = self.records.add_ata(NewAta {
            title: title.to_string(),
            source_id: source_id.to_string(),
            raw_path: source
                .raw_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        });

        let ata = match record {
            Ok(ata) => ata,
            Err(e) => {
                tracing::error!("Failed to record ata '{}': {:#}", title, e);
                match self.dense.delete_source(source_id).await {
                    Ok(n) => tracing::info!("Removed {} vectors of source {}", n, source_id),
                    Err(cleanup) => {
                        tracing::warn!("Vector cleanup for {} failed: {}", source_id, cleanup)
                    }
                }
                return Err(RagError::Ingestion(format!("could not record '{}'", title)));
            }
        };

        tracing::info!(
            "Ingested '{}' (ata={}, source={}, {} passages)",
            ata.title,
            ata.id,
            source_id,
            stored
        );

        Ok(IngestReport {
            ata_id: ata.id,
            source_id: source_id.to_string(),
            title: ata.title,
            passage_count: stored,
        })
    }

    /// 파일 업로드 수집
    ///
    /// 파일을 업로드 디렉토리에 복사한 뒤 추출/수집합니다.
    pub async fn ingest_file(&self, path: &Path, title: Option<String>) -> RagResult<IngestReport> {
        let stored_path = self.store_upload(path).await?;

        let document = match extract_text(&stored_path).await {
            Ok(doc) => doc,
            Err(e) => {
                self.discard_upload(&stored_path);
                return Err(e);
            }
        };

        let title = title.or_else(|| Some(default_title(Some(path))));
        self.ingest_document(
            &document.text,
            SourceMetadata {
                title,
                raw_path: Some(stored_path),
            },
        )
        .await
    }

    /// 회의록 목록 (최신순)
    pub fn list_atas(&self, limit: usize) -> RagResult<Vec<Ata>> {
        Ok(self.records.list_atas(limit)?)
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    async fn store_upload(&self, path: &Path) -> RagResult<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| RagError::Validation(format!("not a file path: {:?}", path)))?;

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .context("Failed to create uploads directory")?;

        let target = self.uploads_dir.join(format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            file_name.to_string_lossy()
        ));

        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| RagError::Validation(format!("cannot read {:?}: {}", path, e)))?;

        Ok(target)
    }

    /// 업로드 디렉토리 안의 파일만 삭제 (best-effort)
    fn discard_upload(&self, path: &Path) {
        if !path.starts_with(&self.uploads_dir) {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::info!("Removed failed upload {:?}", path),
            Err(e) => tracing::warn!("Could not remove failed upload {:?}: {}", path, e),
        }
    }
}

fn default_title(path: Option<&Path>) -> String {
    path.and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("Ata {}", chrono::Utc::now().format("%Y-%m-%d %H:%M")))
}

// ============================================================================
// Tests
// ============================================================================
