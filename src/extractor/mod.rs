//! 콘텐츠 추출 모듈 (문서 저장소)
//!
//! 업로드된 회의록 파일에서 텍스트를 추출합니다.
//! - 텍스트 파일: UTF-8로 직접 읽기
//! - PDF 파일: pdf-extract로 텍스트 추출

pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::collector::FileType;
use crate::error::{RagError, RagResult};

/// 추출된 문서
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// 원본 경로
    pub path: PathBuf,
    pub file_type: FileType,
    /// 추출된 텍스트 (PDF는 페이지를 빈 줄로 연결)
    pub text: String,
    /// 페이지 수 (텍스트 파일은 1)
    pub page_count: usize,
}

impl ExtractedDocument {
    /// 파일 이름에서 제목 추정
    pub fn default_title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "ata".to_string())
    }
}

/// 파일에서 텍스트 추출
///
/// 지원하지 않는 확장자는 `Validation`, 내용이 없으면 `EmptyDocument`입니다.
pub async fn extract_text(path: &Path) -> RagResult<ExtractedDocument> {
    let file_type = FileType::from_path(path).ok_or_else(|| {
        RagError::Validation(format!(
            "unsupported file type: {:?} (expected .pdf or .txt)",
            path.file_name().unwrap_or_default()
        ))
    })?;

    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read metadata: {:?}", path))?;
    if metadata.len() == 0 {
        return Err(RagError::EmptyDocument);
    }

    let (text, page_count) = match file_type {
        FileType::Text => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RagError::Validation(format!("text file is not valid UTF-8: {}", e)))?;
            (text, 1)
        }
        FileType::Pdf => {
            // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
            let owned = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
                .await
                .context("PDF extraction task failed")?
                .map_err(|e| RagError::Ingestion(format!("{:#}", e)))?;

            let page_count = pages.len();
            let text = pages
                .into_iter()
                .map(|(_, page)| page)
                .collect::<Vec<_>>()
                .join("\n\n");
            (text, page_count)
        }
    };

    if text.trim().is_empty() {
        return Err(RagError::EmptyDocument);
    }

    tracing::debug!(
        "Extracted {} chars from {:?} ({} pages)",
        text.chars().count(),
        path,
        page_count
    );

    Ok(ExtractedDocument {
        path: path.to_path_buf(),
        file_type,
        text,
        page_count,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ata_marco.txt");
        std::fs::write(&path, "Ata da reunião ordinária.\n\nPauta: eleição.").unwrap();

        let doc = extract_text(&path).await.unwrap();
        assert_eq!(doc.file_type, FileType::Text);
        assert_eq!(doc.page_count, 1);
        assert!(doc.text.contains("eleição"));
        assert_eq!(doc.default_title(), "ata_marco");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ata.docx");
        std::fs::write(&path, "conteúdo").unwrap();

        assert!(matches!(extract_text(&path).await, Err(RagError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_files() {
        let dir = TempDir::new().unwrap();

        let zero = dir.path().join("vazio.txt");
        std::fs::write(&zero, "").unwrap();
        assert!(matches!(extract_text(&zero).await, Err(RagError::EmptyDocument)));

        let blank = dir.path().join("branco.txt");
        std::fs::write(&blank, "  \n\t \n").unwrap();
        assert!(matches!(extract_text(&blank).await, Err(RagError::EmptyDocument)));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [0x41u8, 0xff, 0xfe, 0x42]).unwrap();

        assert!(matches!(extract_text(&path).await, Err(RagError::Validation(_))));
    }
}
