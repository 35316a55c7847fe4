//! Text Chunking Module
//!
//! 회의록(ata) 구조를 인식하는 재귀 분할기입니다.
//! 번호 목록 `1)`, 로마 숫자 `IV.`, `Item 3.` 같은 구조 경계를 먼저 시도하고,
//! 문단 → 줄 → 단어 → 문자 순으로 내려갑니다.
//! 구분자는 버리지 않고 다음 청크의 시작에 붙여 둡니다.

use regex::Regex;

use crate::error::{RagError, RagResult};

use super::passage::{Passage, PassageMetadata};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 번호 목록: `1) ...`, `20) ...`
pub const NUMBERED_ITEM_SEPARATOR: &str = r"(?m)^\s*\d{1,2}\)\s";
/// 로마 숫자 항목: `I.`, `IV.`, `XX.`
pub const ROMAN_ITEM_SEPARATOR: &str = r"(?m)^\s*(?:X{0,3}(?:IX|IV|V?I{1,3}|V)|X{1,3})\.\s";
/// 명시적 항목 표기: `Item 1.`, `Item 12.`
pub const EXPLICIT_ITEM_SEPARATOR: &str = r"(?m)^\s*Item \d{1,2}\.\s";

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 목표 청크 크기 (문자 수)
    pub target_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub overlap: usize,
    /// 우선순위 순 구분자 (정규식, 빈 문자열은 문자 단위 분할)
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_size: 800,
            overlap: 200,
            separators: default_separators(),
        }
    }
}

impl ChunkConfig {
    /// 크기/오버랩만 지정하고 구분자는 기본값 사용
    pub fn with_size(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size,
            overlap,
            separators: default_separators(),
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> RagResult<()> {
        if self.target_size == 0 {
            return Err(RagError::Validation("chunk target size must be > 0".into()));
        }
        if self.overlap >= self.target_size {
            return Err(RagError::Validation(format!(
                "chunk overlap ({}) must be smaller than target size ({})",
                self.overlap, self.target_size
            )));
        }
        if self.separators.is_empty() {
            return Err(RagError::Validation("at least one separator is required".into()));
        }
        Ok(())
    }
}

/// 기본 구분자 목록 (우선순위 순)
pub fn default_separators() -> Vec<String> {
    vec![
        NUMBERED_ITEM_SEPARATOR.to_string(),
        ROMAN_ITEM_SEPARATOR.to_string(),
        EXPLICIT_ITEM_SEPARATOR.to_string(),
        regex::escape("\n\n"),
        regex::escape("\n"),
        regex::escape(" "),
        String::new(),
    ]
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 문자열로 분할
    fn split_text(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 텍스트를 순서가 있는 Passage 목록으로 변환
    ///
    /// 빈 문서는 `EmptyDocument`, 분할 결과가 없으면 `NoChunksProduced`.
    fn chunk_document(
        &self,
        text: &str,
        source_id: &str,
        title: Option<&str>,
    ) -> RagResult<Vec<Passage>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument);
        }

        let passages: Vec<Passage> = self
            .split_text(text)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .enumerate()
            .map(|(i, content)| {
                Passage::new(
                    content,
                    PassageMetadata {
                        source_id: source_id.to_string(),
                        chunk_index: i as i32,
                        title: title.map(str::to_string),
                    },
                )
            })
            .collect();

        if passages.is_empty() {
            return Err(RagError::NoChunksProduced);
        }

        Ok(passages)
    }
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 구분자 (컴파일된 정규식 또는 문자 단위)
#[derive(Debug)]
enum Separator {
    Pattern(Regex),
    Characters,
}

/// 재귀 구분자 청커
///
/// 텍스트에 존재하는 가장 우선순위 높은 구분자로 나누고,
/// 여전히 큰 조각은 다음 구분자로 재귀 분할한 뒤,
/// 작은 조각들을 오버랩을 유지하며 목표 크기까지 병합합니다.
#[derive(Debug)]
pub struct RecursiveChunker {
    target_size: usize,
    overlap: usize,
    separators: Vec<Separator>,
}

impl RecursiveChunker {
    /// 설정으로 생성 (정규식 컴파일 실패 시 Validation 에러)
    pub fn new(config: ChunkConfig) -> RagResult<Self> {
        config.validate()?;

        let separators = config
            .separators
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Ok(Separator::Characters)
                } else {
                    Regex::new(s).map(Separator::Pattern).map_err(|e| {
                        RagError::Validation(format!("invalid separator pattern {:?}: {}", s, e))
                    })
                }
            })
            .collect::<RagResult<Vec<_>>>()?;

        Ok(Self {
            target_size: config.target_size,
            overlap: config.overlap,
            separators,
        })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> RagResult<Self> {
        Self::new(ChunkConfig::default())
    }

    fn split_recursive(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        // 텍스트에 실제로 등장하는 첫 구분자 선택
        let mut chosen = separators.len().saturating_sub(1);
        for (i, sep) in separators.iter().enumerate() {
            match sep {
                Separator::Characters => {
                    chosen = i;
                    break;
                }
                Separator::Pattern(re) if re.is_match(text) => {
                    chosen = i;
                    break;
                }
                Separator::Pattern(_) => {}
            }
        }

        let (separator, remaining) = match separators.get(chosen) {
            Some(sep) => (sep, &separators[chosen + 1..]),
            None => return vec![text.to_string()],
        };
        // 문자 단위 분할 이후로는 더 내려갈 곳이 없음
        let remaining: &[Separator] = match separator {
            Separator::Characters => &[],
            Separator::Pattern(_) => remaining,
        };

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.target_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge_pieces(&small));
                small.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_pieces(&small));
        }

        chunks
    }

    /// 작은 조각들을 목표 크기까지 병합 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.target_size && !window.is_empty() {
                if total > self.target_size {
                    tracing::warn!(
                        "Created a chunk of size {}, larger than target {}",
                        total,
                        self.target_size
                    );
                }

                if let Some(chunk) = join_trimmed(&window) {
                    merged.push(chunk);
                }

                // 오버랩 크기 이하가 될 때까지 앞쪽 조각 제거
                while !window.is_empty()
                    && (total > self.overlap || total + len > self.target_size)
                {
                    total -= char_len(window[0]);
                    window.remove(0);
                }
            }

            window.push(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            merged.push(chunk);
        }

        merged
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 (바이트 수가 아님)
#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 구분자로 분할하되 매치된 구분자는 다음 조각의 시작에 유지
fn split_keep_start<'a>(text: &'a str, separator: &Separator) -> Vec<&'a str> {
    match separator {
        Separator::Characters => text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect(),
        Separator::Pattern(re) => {
            let mut pieces = Vec::new();
            let mut start = 0;

            for m in re.find_iter(text) {
                if m.start() > start {
                    pieces.push(&text[start..m.start()]);
                }
                start = m.start();
            }
            if start < text.len() {
                pieces.push(&text[start..]);
            }

            pieces.retain(|p| !p.is_empty());
            pieces
        }
    }
}

/// 조각을 이어 붙이고 앞뒤 공백 제거 (비면 None)
fn join_trimmed(pieces: &[&str]) -> Option<String> {
    let joined = pieces.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> RagResult<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::with_defaults()?))
}

/// 설정을 지정한 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> RagResult<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target_size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig::with_size(target_size, overlap)).unwrap()
    }

    #[test]
    fn test_empty_document_error() {
        let chunker = chunker(800, 200);
        let result = chunker.chunk_document("   \n\t ", "src", None);
        assert!(matches!(result, Err(RagError::EmptyDocument)));
    }

    #[test]
    fn test_small_text_single_passage() {
        let chunker = chunker(800, 200);
        let passages = chunker
            .chunk_document("Ata da reunião ordinária.", "src-1", Some("Ata 01"))
            .unwrap();

        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].content, "Ata da reunião ordinária.");
        assert_eq!(passages[0].metadata.source_id, "src-1");
        assert_eq!(passages[0].metadata.chunk_index, 0);
        assert_eq!(passages[0].metadata.title.as_deref(), Some("Ata 01"));
    }

    #[test]
    fn test_three_paragraphs_chunk_count_depends_on_size() {
        let para = "O colegiado discutiu o calendário acadêmico e aprovou as alterações propostas.";
        let text = format!("{}\n\n{}\n\n{}", para, para, para);

        let large = chunker(800, 200).chunk_document(&text, "s", None).unwrap();
        assert_eq!(large.len(), 1);

        let small = chunker(100, 20).chunk_document(&text, "s", None).unwrap();
        assert_eq!(small.len(), 3);

        for p in small.iter() {
            assert!(!p.content.trim().is_empty());
            assert!(p.content.chars().count() <= 100);
        }
    }

    #[test]
    fn test_numbered_items_keep_marker_at_start() {
        let text = "Pauta:\n1) Aprovação da ata anterior\n2) Informes da coordenação\n";
        let chunks = chunker(40, 0).split_text(text);

        assert!(chunks.len() >= 2);
        assert!(chunks.iter().any(|c| c.starts_with("2) Informes")));
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_explicit_item_marker_split() {
        let text = "Item 1. Abertura da sessão pelo presidente\nItem 2. Leitura do expediente recebido";
        let chunks = chunker(50, 0).split_text(text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("Item 1."));
        assert!(chunks[1].starts_with("Item 2."));
    }

    #[test]
    fn test_roman_item_marker_split() {
        let text = "I. Abertura dos trabalhos da sessão\nII. Deliberações sobre os processos";
        let chunks = chunker(40, 0).split_text(text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with("II."));
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let text = "a".repeat(25);
        let chunks = chunker(10, 0).split_text(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn test_overlap_repeats_trailing_words() {
        let text = "um dois tres quatro cinco seis sete oito nove dez";
        let chunks = chunker(20, 8).split_text(text);

        assert!(chunks.len() > 1);
        // 이전 청크의 마지막 단어가 다음 청크 앞에 반복됨
        let last_word = chunks[0].split_whitespace().last().unwrap();
        assert!(chunks[1].starts_with(last_word));
    }

    #[test]
    fn test_invalid_config() {
        assert!(ChunkConfig::with_size(100, 100).validate().is_err());
        assert!(ChunkConfig::with_size(0, 0).validate().is_err());

        let config = ChunkConfig {
            target_size: 100,
            overlap: 10,
            separators: vec!["(unclosed".to_string()],
        };
        assert!(matches!(
            RecursiveChunker::new(config),
            Err(RagError::Validation(_))
        ));
    }

    #[test]
    fn test_chunk_indices_are_ordered() {
        let text = (0..20)
            .map(|i| format!("Parágrafo {} com algum conteúdo de teste.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let passages = chunker(120, 30).chunk_document(&text, "s", None).unwrap();

        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.metadata.chunk_index, i as i32);
        }
    }

    #[test]
    fn test_multibyte_text_character_split() {
        let text = "ção".repeat(10);
        let chunks = chunker(7, 0).split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(chunks.concat(), text);
    }
}
