//! Transcript persistence.
//!
//! Every exchange is recorded as two independent messages, one from the user
//! and one from the bot. The store is append-only apart from an explicit
//! per-user purge.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use solace_core::error::SolaceError;
use solace_core::types::{EmotionLabel, Sender, TranscriptEntry};

use crate::db::Database;

/// Durable record of conversation messages.
///
/// `user_id` of `None` addresses guest conversations.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append entries in order. Implementations write them atomically.
    async fn append(&self, entries: &[TranscriptEntry]) -> Result<(), SolaceError>;

    /// All messages for a user, oldest first.
    async fn history(&self, user_id: Option<&str>) -> Result<Vec<TranscriptEntry>, SolaceError>;

    /// Delete every message for a user. Returns the number removed.
    async fn purge(&self, user_id: Option<&str>) -> Result<usize, SolaceError>;
}

// =============================================================================
// SQLite
// =============================================================================

/// Transcript store backed by the `messages` table.
///
/// rusqlite is blocking, so each call runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteTranscriptStore {
    db: Arc<Database>,
}

impl SqliteTranscriptStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, SolaceError>
    where
        F: FnOnce(&Database) -> Result<T, SolaceError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| SolaceError::Storage(format!("Transcript task failed: {}", e)))?
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn append(&self, entries: &[TranscriptEntry]) -> Result<(), SolaceError> {
        let entries = entries.to_vec();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(|e| SolaceError::Storage(e.to_string()))?;
                for entry in &entries {
                    tx.execute(
                        "INSERT INTO messages (id, user_id, sender, text, emotion, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            entry.id.to_string(),
                            entry.user_id,
                            entry.sender.as_str(),
                            entry.text,
                            entry.emotion.map(|e| e.as_str()),
                            entry.created_at.timestamp_millis(),
                        ],
                    )
                    .map_err(|e| SolaceError::Storage(format!("Failed to save message: {}", e)))?;
                }
                tx.commit()
                    .map_err(|e| SolaceError::Storage(format!("Failed to commit messages: {}", e)))
            })
        })
        .await
    }

    async fn history(&self, user_id: Option<&str>) -> Result<Vec<TranscriptEntry>, SolaceError> {
        let user_id = user_id.map(str::to_string);
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, user_id, sender, text, emotion, created_at
                         FROM messages
                         WHERE user_id IS ?1
                         ORDER BY created_at ASC, rowid ASC",
                    )
                    .map_err(|e| SolaceError::Storage(e.to_string()))?;

                let rows = stmt
                    .query_map(rusqlite::params![user_id], row_to_raw)
                    .map_err(|e| SolaceError::Storage(e.to_string()))?;

                let mut entries = Vec::new();
                for row in rows {
                    let raw = row.map_err(|e| SolaceError::Storage(e.to_string()))?;
                    entries.push(raw.into_entry()?);
                }
                Ok(entries)
            })
        })
        .await
    }

    async fn purge(&self, user_id: Option<&str>) -> Result<usize, SolaceError> {
        let user_id = user_id.map(str::to_string);
        self.blocking(move |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "DELETE FROM messages WHERE user_id IS ?1",
                    rusqlite::params![user_id],
                )
                .map_err(|e| SolaceError::Storage(format!("Failed to purge messages: {}", e)))
            })
        })
        .await
    }
}

struct RawMessage {
    id: String,
    user_id: Option<String>,
    sender: String,
    text: String,
    emotion: Option<String>,
    created_at: i64,
}

impl RawMessage {
    fn into_entry(self) -> Result<TranscriptEntry, SolaceError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| SolaceError::Storage(format!("Invalid message id: {}", e)))?;
        let sender = self.sender.parse::<Sender>().map_err(SolaceError::Storage)?;
        let created_at = Utc
            .timestamp_millis_opt(self.created_at)
            .single()
            .ok_or_else(|| {
                SolaceError::Storage(format!("Invalid timestamp: {}", self.created_at))
            })?;
        Ok(TranscriptEntry {
            id,
            user_id: self.user_id,
            sender,
            text: self.text,
            emotion: self.emotion.as_deref().map(EmotionLabel::normalize),
            created_at,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sender: row.get(2)?,
        text: row.get(3)?,
        emotion: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// =============================================================================
// In-memory
// =============================================================================

/// Transcript store kept in process memory.
///
/// Used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryTranscriptStore {
    entries: RwLock<Vec<TranscriptEntry>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all users.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(&self, entries: &[TranscriptEntry]) -> Result<(), SolaceError> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(())
    }

    async fn history(&self, user_id: Option<&str>) -> Result<Vec<TranscriptEntry>, SolaceError> {
        let mut matching: Vec<TranscriptEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.user_id.as_deref() == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }

    async fn purge(&self, user_id: Option<&str>) -> Result<usize, SolaceError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.user_id.as_deref() != user_id);
        Ok(before - entries.len())
    }
}
