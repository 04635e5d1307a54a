//! Chat history abstraction.
//!
//! The [`HistoryStore`] trait is the append-only transcript contract the ask
//! pipeline reads prior turns from and writes answered turns to. The SQLite
//! implementation lives in the `docsight` app crate; [`InMemoryHistory`]
//! serves tests and embedded use.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ConversationTurn;

/// Append-only per-user chat transcript.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one answered turn for `username`.
    async fn append(&self, username: &str, question: &str, answer: &str) -> Result<()>;

    /// The `limit` most recent turns for `username`, oldest first.
    async fn recent(&self, username: &str, limit: usize) -> Result<Vec<ConversationTurn>>;
}

/// In-memory transcript keyed by username.
#[derive(Default)]
pub struct InMemoryHistory {
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, username: &str, question: &str, answer: &str) -> Result<()> {
        let mut turns = self
            .turns
            .write()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        turns
            .entry(username.to_string())
            .or_default()
            .push(ConversationTurn {
                question: question.to_string(),
                answer: answer.to_string(),
            });
        Ok(())
    }

    async fn recent(&self, username: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let turns = self
            .turns
            .read()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        let all = match turns.get(username) {
            Some(t) => t,
            None => return Ok(Vec::new()),
        };
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}
