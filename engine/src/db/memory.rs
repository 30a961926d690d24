//! Conversational Memory Store
//!
//! Records user and assistant turns per session and retrieves the most
//! relevant prior turns with FTS5 bm25 ranking. Every query filters on
//! `session_id`, so one session never sees another's turns.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::llm::MessageRole;

/// Cap on query tokens handed to FTS5
const MAX_QUERY_TERMS: usize = 32;

/// One recorded turn
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTurn {
    pub role: String,
    pub content: String,
}

impl MemoryTurn {
    /// `"role: content"`, the form stages splice into prompts
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Repository for session-scoped conversational memory
#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a turn for `session_id`.
    pub async fn record(&self, role: MessageRole, content: &str, session_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_turns (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.to_string())
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to record conversation turn")?;

        debug!(session_id, %role, chars = content.len(), "Recorded turn");
        Ok(())
    }

    /// Up to `k` prior turns of `session_id` as `"role: content"`, most
    /// relevant first.
    ///
    /// A query with no searchable terms falls back to the `k` most recent
    /// turns in chronological order.
    pub async fn retrieve(&self, query: &str, session_id: &str, k: usize) -> Result<Vec<String>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let turns = match fts_query(query) {
            Some(match_expr) => self.search(&match_expr, session_id, k).await?,
            None => self.recent(session_id, k).await?,
        };

        Ok(turns.iter().map(MemoryTurn::render).collect())
    }

    async fn search(&self, match_expr: &str, session_id: &str, k: usize) -> Result<Vec<MemoryTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT t.role, t.content
            FROM conversation_fts
            JOIN conversation_turns t ON t.id = conversation_fts.rowid
            WHERE conversation_fts MATCH ? AND t.session_id = ?
            ORDER BY bm25(conversation_fts), t.id DESC
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(session_id)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to execute FTS query on conversation_fts")?;

        Ok(rows
            .into_iter()
            .map(|row| MemoryTurn {
                role: row.get("role"),
                content: row.get("content"),
            })
            .collect())
    }

    /// The `k` most recent turns of a session, oldest first
    pub async fn recent(&self, session_id: &str, k: usize) -> Result<Vec<MemoryTurn>> {
        let rows = sqlx::query(
            "SELECT role, content FROM conversation_turns WHERE session_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent turns")?;

        let mut turns: Vec<MemoryTurn> = rows
            .into_iter()
            .map(|row| MemoryTurn {
                role: row.get("role"),
                content: row.get("content"),
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    /// Number of turns recorded for a session
    pub async fn count(&self, session_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM conversation_turns WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count conversation turns")
    }
}

/// Turn free text into an FTS5 expression of quoted terms joined by OR.
///
/// Quoting every term keeps user punctuation and FTS operators (`NEAR`, `*`,
/// `-`) from being interpreted as query syntax.
fn fts_query(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let term = word.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
        if terms.len() == MAX_QUERY_TERMS {
            break;
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}
