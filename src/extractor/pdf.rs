//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 텍스트 추출
///
/// 페이지별로 (페이지 번호, 텍스트) 튜플 벡터를 반환합니다. 페이지 번호는 1부터.
/// 텍스트 레이어가 없는 PDF(스캔본)는 빈 벡터입니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i + 1, page))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리 (폼피드 기준)
///
/// 페이지 안의 줄바꿈 구조는 그대로 둡니다. 항목 번호 분할에 필요합니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Ata 1\n1) Abertura\x0cAta 1\n2) Informes\x0c\x0c";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], "Ata 1\n1) Abertura");
        assert_eq!(pages[1], "Ata 1\n2) Informes");
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("  Texto corrido sem quebras de página  ");
        assert_eq!(pages, vec!["Texto corrido sem quebras de página".to_string()]);
    }

    #[test]
    fn test_missing_pdf_is_error() {
        assert!(extract_text_from_pdf(Path::new("/nonexistent/ata.pdf")).is_err());
    }
}
