//! Lexical Index - 키워드 기반 BM25 검색
//!
//! 밀집 인덱스의 전체 스냅샷으로 한 번에 구축되는 메모리 내 FTS5 인덱스입니다.
//! 점진적으로 갱신되지 않으며, 새 업로드를 반영하려면 다시 구축해야 합니다.
//! source: https://www.sqlite.org/fts5.html#the_bm25_function

use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::passage::{Passage, RetrievalResult};

/// 메모리 FTS5 인덱스 상태
struct FtsState {
    conn: Mutex<Connection>,
    /// rowid - 1 → Passage
    passages: Vec<Passage>,
}

/// 어휘(키워드) 인덱스
///
/// 실제 Passage 없이 구축되면 비활성 상태가 되며, 이때 검색은 빈 결과를 반환합니다.
/// 비활성 여부는 `is_enabled()`로 구분합니다 (검색 결과 0건과 다름).
pub struct LexicalIndex {
    state: Option<FtsState>,
}

impl LexicalIndex {
    /// 비활성 인덱스
    pub fn disabled() -> Self {
        Self { state: None }
    }

    /// Passage 전체 스냅샷으로 인덱스 구축
    pub fn build(passages: Vec<Passage>) -> Result<Self> {
        let passages: Vec<Passage> = passages
            .into_iter()
            .filter(|p| !p.content.trim().is_empty())
            .collect();

        if passages.is_empty() {
            tracing::warn!("Lexical index built with no passages; keyword search disabled");
            return Ok(Self::disabled());
        }

        let mut conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;

        conn.execute(
            "CREATE VIRTUAL TABLE passages_fts USING fts5(
                content,
                tokenize = 'unicode61 remove_diacritics 2'
            )",
            [],
        )
        .context("Failed to create FTS5 table")?;

        {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO passages_fts(rowid, content) VALUES (?1, ?2)")?;
                for (i, passage) in passages.iter().enumerate() {
                    stmt.execute(params![(i + 1) as i64, passage.content])?;
                }
            }
            tx.commit().context("Failed to populate FTS5 table")?;
        }

        tracing::info!("Lexical index built with {} passages", passages.len());

        Ok(Self {
            state: Some(FtsState {
                conn: Mutex::new(conn),
                passages,
            }),
        })
    }

    /// 활성 여부 (구축 시 실제 Passage가 있었는지)
    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// 색인된 Passage 수
    pub fn len(&self) -> usize {
        self.state.as_ref().map(|s| s.passages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// BM25 키워드 검색 (점수 높은 순)
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let state = match &self.state {
            Some(state) => state,
            None => return Ok(vec![]),
        };

        let match_expr = build_match_query(query);
        if match_expr.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let conn = state
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT rowid, bm25(passages_fts) AS score
             FROM passages_fts
             WHERE passages_fts MATCH ?1
             ORDER BY score
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![match_expr, k as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("FTS5 query failed")?;

        Ok(rows
            .into_iter()
            .filter_map(|(rowid, bm25)| {
                let passage = state.passages.get((rowid - 1) as usize)?;
                // bm25()는 낮을수록 관련도가 높음 → 부호 반전
                Some(RetrievalResult::new(passage.clone(), (-bm25) as f32))
            })
            .collect())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// FTS5 MATCH 식 생성
///
/// 질문 전체를 AND로 묶으면 거의 매칭되지 않으므로 단어들을 OR로 연결합니다.
/// 각 단어는 따옴표로 감싸 FTS5 연산자로 해석되지 않게 합니다.
fn build_match_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================
