//! Record Store - rusqlite 기반 관계형 저장소
//!
//! 업로드된 회의록(ata), 대화(conversation), 질의응답 메시지(message)를 저장합니다.
//! 저장 위치: ~/.ata-rag/records.db
//!
//! 대화는 항상 한 사용자에게 속하며, 모든 조회/추가 시 소유권을 확인합니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.ata-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ata-rag")
}

/// 제목 최대 길이 (문자 수)
pub const TITLE_MAX_CHARS: usize = 75;

/// 빈 질문으로 시작된 대화의 기본 제목
pub const DEFAULT_CONVERSATION_TITLE: &str = "Nova conversa";

// ============================================================================
// Types
// ============================================================================

/// 업로드된 회의록 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ata {
    pub id: i64,
    pub title: String,
    /// 벡터 저장소의 Passage들이 공유하는 문서 ID
    pub source_id: String,
    pub raw_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 새 회의록 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewAta {
    pub title: String,
    pub source_id: String,
    pub raw_path: Option<String>,
}

/// 대화 요약 (목록용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 질문/답변 한 쌍
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub user_id: i64,
    pub question: String,
    pub answer: String,
    pub model_identifier: String,
    pub created_at: DateTime<Utc>,
}

/// 새 메시지 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewExchange<'a> {
    pub user_id: i64,
    /// 이어갈 대화 (없거나 소유하지 않은 대화면 새로 생성)
    pub conversation_id: Option<Uuid>,
    pub question: &'a str,
    pub answer: &'a str,
    pub model_identifier: &'a str,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub ata_count: usize,
    pub conversation_count: usize,
    pub message_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// RecordStore
// ============================================================================

/// 관계형 저장소
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl RecordStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 데이터 디렉토리 아래 records.db 열기
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join("records.db"))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS atas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                source_id TEXT NOT NULL UNIQUE,
                raw_path TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user
                ON conversations(user_id, updated_at);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                model_identifier TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);",
        )
        .context("Failed to initialize schema")?;

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Atas
    // ------------------------------------------------------------------------

    /// 회의록 레코드 저장
    pub fn add_ata(&self, ata: NewAta) -> Result<Ata> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO atas (title, source_id, raw_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![ata.title, ata.source_id, ata.raw_path, format_datetime(&now)],
        )
        .context("Failed to insert ata")?;

        let id = conn.last_insert_rowid();
        tracing::info!("Added ata: {} (id={}, source={})", ata.title, id, ata.source_id);

        Ok(Ata {
            id,
            title: ata.title,
            source_id: ata.source_id,
            raw_path: ata.raw_path,
            created_at: now,
        })
    }

    /// 회의록 목록 (최신순)
    pub fn list_atas(&self, limit: usize) -> Result<Vec<Ata>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, source_id, raw_path, created_at FROM atas
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(Ata {
                id: row.get(0)?,
                title: row.get(1)?,
                source_id: row.get(2)?,
                raw_path: row.get(3)?,
                created_at: parse_datetime(row.get::<_, String>(4)?),
            })
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ------------------------------------------------------------------------
    // Conversations & Messages
    // ------------------------------------------------------------------------

    /// 질문/답변 저장
    ///
    /// 대화 생성(필요 시), 메시지 추가, `updated_at` 갱신을 하나의 트랜잭션으로 처리합니다.
    /// 실패하면 아무것도 남지 않습니다.
    pub fn record_exchange(&self, exchange: NewExchange<'_>) -> Result<Message> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = Utc::now();
        let stamp = format_datetime(&now);

        let conversation_id = resolve_conversation(&tx, &exchange, &stamp)?;

        tx.execute(
            "INSERT INTO messages (conversation_id, user_id, question, answer, model_identifier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation_id.to_string(),
                exchange.user_id,
                exchange.question,
                exchange.answer,
                exchange.model_identifier,
                stamp
            ],
        )
        .context("Failed to insert message")?;
        let message_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![stamp, conversation_id.to_string()],
        )
        .context("Failed to touch conversation")?;

        tx.commit().context("Failed to commit exchange")?;

        Ok(Message {
            id: message_id,
            conversation_id,
            user_id: exchange.user_id,
            question: exchange.question.to_string(),
            answer: exchange.answer.to_string(),
            model_identifier: exchange.model_identifier.to_string(),
            created_at: now,
        })
    }

    /// 사용자의 대화 목록 (최근 갱신순)
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, created_at, updated_at FROM conversations
             WHERE user_id = ?1
             ORDER BY updated_at DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|(id, user_id, title, created, updated)| {
                Some(Conversation {
                    id: Uuid::parse_str(&id).ok()?,
                    user_id,
                    title,
                    created_at: parse_datetime(created),
                    updated_at: parse_datetime(updated),
                })
            })
            .collect())
    }

    /// 대화 기록 (오래된 순)
    ///
    /// 대화가 없거나 다른 사용자의 것이면 빈 목록을 반환합니다.
    pub fn get_history(&self, user_id: i64, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        if !owns_conversation(&conn, user_id, &conversation_id)? {
            return Ok(vec![]);
        }

        let mut stmt = conn.prepare(
            "SELECT id, user_id, question, answer, model_identifier, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.to_string()], |row| {
            Ok(Message {
                id: row.get(0)?,
                conversation_id,
                user_id: row.get(1)?,
                question: row.get(2)?,
                answer: row.get(3)?,
                model_identifier: row.get(4)?,
                created_at: parse_datetime(row.get::<_, String>(5)?),
            })
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// 대화 소유 여부
    pub fn owns(&self, user_id: i64, conversation_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        owns_conversation(&conn, user_id, &conversation_id)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            ata_count: count("atas")?,
            conversation_count: count("conversations")?,
            message_count: count("messages")?,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 첫 질문으로 대화 제목 생성
///
/// 75자를 넘으면 잘라서 "..."를 붙이고, 빈 질문은 기본 제목을 사용합니다.
pub fn conversation_title(question: &str) -> String {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }

    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// 기존 대화를 이어가거나 새 대화 생성
fn resolve_conversation(tx: &Transaction<'_>, exchange: &NewExchange<'_>, stamp: &str) -> Result<Uuid> {
    if let Some(requested) = exchange.conversation_id {
        if owns_conversation(tx, exchange.user_id, &requested)? {
            return Ok(requested);
        }
        tracing::warn!(
            "Conversation {} not owned by user {}; starting a new one",
            requested,
            exchange.user_id
        );
    }

    let id = Uuid::new_v4();
    tx.execute(
        "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![
            id.to_string(),
            exchange.user_id,
            conversation_title(exchange.question),
            stamp
        ],
    )
    .context("Failed to create conversation")?;

    tracing::debug!("Created conversation {} for user {}", id, exchange.user_id);
    Ok(id)
}

fn owns_conversation(conn: &Connection, user_id: i64, conversation_id: &Uuid) -> Result<bool> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM conversations WHERE id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(owner == Some(user_id))
}

/// 고정 폭 RFC3339 (문자열 정렬 = 시간 정렬)
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
