//! SQLite-backed chat history.
//!
//! Every answered question is appended to the `chat_history` table. Reads
//! return the most recent turns for one user, oldest first, which is the
//! order the prompt builder and `GET /history` expect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use docsight_core::history::HistoryStore;
use docsight_core::models::ConversationTurn;

/// Turns returned by `GET /history` and `docsight history` by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// One stored turn with its timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The `limit` most recent entries for `username`, oldest first.
    pub async fn entries(&self, username: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT question, answer, timestamp FROM chat_history \
             WHERE username = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(username)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read chat history for '{}'", username))?;

        let mut entries: Vec<HistoryEntry> = rows
            .iter()
            .map(|row| HistoryEntry {
                question: row.get("question"),
                answer: row.get("answer"),
                timestamp: row.get("timestamp"),
            })
            .collect();
        entries.reverse();
        Ok(entries)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn append(&self, username: &str, question: &str, answer: &str) -> Result<()> {
        let now = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        sqlx::query(
            "INSERT INTO chat_history (username, question, answer, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(question)
        .bind(answer)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save chat turn for '{}'", username))?;
        Ok(())
    }

    async fn recent(&self, username: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .entries(username, limit)
            .await?
            .into_iter()
            .map(|e| ConversationTurn {
                question: e.question,
                answer: e.answer,
            })
            .collect())
    }
}

/// `docsight history`: print a user's recent turns, oldest first.
pub async fn run_history(config: &crate::config::Config, username: &str, limit: usize) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;
    let entries = SqliteHistory::new(pool).entries(username, limit).await?;

    if entries.is_empty() {
        println!("No history for '{}'.", username);
        return Ok(());
    }
    for e in &entries {
        println!("[{}]", e.timestamp);
        println!("Q: {}", e.question);
        println!("A: {}", e.answer);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn store() -> (tempfile::TempDir, SqliteHistory) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("history.sqlite"))
            .await
            .unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        (tmp, SqliteHistory::new(pool))
    }

    #[tokio::test]
    async fn test_recent_oldest_first_and_bounded() {
        let (_tmp, h) = store().await;
        for i in 0..7 {
            h.append("ana", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }
        let turns = h.recent("ana", 5).await.unwrap();
        let qs: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(qs, vec!["q2", "q3", "q4", "q5", "q6"]);
    }

    #[tokio::test]
    async fn test_users_isolated() {
        let (_tmp, h) = store().await;
        h.append("ana", "q", "a").await.unwrap();
        assert!(h.recent("bo", 5).await.unwrap().is_empty());
        let entries = h.entries("ana", DEFAULT_HISTORY_LIMIT).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].timestamp.ends_with('Z'));
    }
}
