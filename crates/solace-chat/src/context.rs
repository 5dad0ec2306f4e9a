//! Short-term conversation memory.
//!
//! Keeps a bounded, FIFO history of recent turns per session key and builds
//! the context summaries the response generator quotes back to the user.
//!
//! Each session sits behind its own async mutex. The orchestrator holds that
//! lock for a whole turn, which serializes turns for one user while turns
//! for different users run in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use solace_core::config::ChatConfig;
use solace_core::types::{EmotionLabel, Turn};

use crate::error::ChatError;

/// Default number of turns kept per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
/// Default number of messages folded into a summary.
pub const SUMMARY_TURNS: usize = 3;
/// Separator between summarized messages.
pub const SUMMARY_SEPARATOR: &str = " → ";

// =============================================================================
// Session
// =============================================================================

/// Per-user short-term memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub history: VecDeque<Turn>,
    pub last_emotion: EmotionLabel,
    pub last_active: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            history: VecDeque::new(),
            last_emotion: EmotionLabel::Neutral,
            last_active: Utc::now(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, evicting the oldest entries beyond `limit`.
    pub fn record(&mut self, turn: Turn, limit: usize) {
        self.last_emotion = turn.emotion;
        self.history.push_back(turn);
        while self.history.len() > limit {
            self.history.pop_front();
        }
        self.last_active = Utc::now();
    }

    /// Snapshot of the history, oldest first.
    pub fn recent(&self) -> Vec<Turn> {
        self.history.iter().cloned().collect()
    }

    /// Summary of the committed history.
    pub fn summary(&self, turns: usize) -> Option<String> {
        summarize_messages(self.history.iter().map(|t| t.message.as_str()), turns)
    }

    /// Summary of the history as if `pending` had already been recorded.
    pub fn provisional_summary(&self, pending: &str, turns: usize) -> Option<String> {
        summarize_messages(
            self.history
                .iter()
                .map(|t| t.message.as_str())
                .chain(std::iter::once(pending)),
            turns,
        )
    }
}

/// Join the last `SUMMARY_TURNS` messages of `history`.
///
/// Returns `None` for an empty history.
pub fn summarize(history: &[Turn]) -> Option<String> {
    summarize_messages(history.iter().map(|t| t.message.as_str()), SUMMARY_TURNS)
}

/// Join the last `turns` messages with [`SUMMARY_SEPARATOR`].
///
/// Returns `None` when nothing would be joined.
pub fn summarize_messages<'a, I>(messages: I, turns: usize) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let all: Vec<&str> = messages.into_iter().collect();
    if all.is_empty() || turns == 0 {
        return None;
    }
    let start = all.len().saturating_sub(turns);
    Some(all[start..].join(SUMMARY_SEPARATOR))
}

// =============================================================================
// SessionStore
// =============================================================================

/// Shared handle to one session.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// All live sessions, keyed by user id or the guest key.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    history_limit: usize,
    summary_turns: usize,
    ttl: Option<Duration>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, SUMMARY_TURNS, None)
    }
}

impl SessionStore {
    /// Create a store. `ttl` of `None` keeps sessions until cleared.
    pub fn new(history_limit: usize, summary_turns: usize, ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
            summary_turns,
            ttl,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        let ttl = (config.session_ttl_minutes > 0)
            .then(|| Duration::minutes(i64::from(config.session_ttl_minutes)));
        Self::new(config.history_limit, config.summary_turns, ttl)
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn summary_turns(&self) -> usize {
        self.summary_turns
    }

    /// Whether `session` has been idle longer than the TTL.
    pub fn is_expired(&self, session: &Session) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now() - session.last_active > ttl,
            None => false,
        }
    }

    /// Return the handle for `key`, creating a fresh session if needed.
    ///
    /// An idle, expired session is replaced rather than reused.
    pub fn handle(&self, key: &str) -> Result<SessionHandle, ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::SessionState(format!("session lock poisoned: {}", e)))?;

        if let Some(handle) = sessions.get(key) {
            let expired = handle
                .try_lock()
                .map(|session| self.is_expired(&session))
                .unwrap_or(false);
            if !expired {
                return Ok(Arc::clone(handle));
            }
            debug!(session = %key, "Session expired, starting fresh");
        }

        let handle: SessionHandle = Arc::new(tokio::sync::Mutex::new(Session::new()));
        sessions.insert(key.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Snapshot of the session for `key`, creating it if absent.
    pub async fn get_or_create(&self, key: &str) -> Result<Session, ChatError> {
        let handle = self.handle(key)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Append `turn` to the session for `key`, creating it if absent.
    pub async fn record_turn(&self, key: &str, turn: Turn) -> Result<(), ChatError> {
        let handle = self.handle(key)?;
        let mut session = handle.lock().await;
        session.record(turn, self.history_limit);
        Ok(())
    }

    /// Recent turns for `key`, oldest first. Empty if there is no live
    /// session.
    pub async fn get_recent(&self, key: &str) -> Vec<Turn> {
        let Some(handle) = self.existing(key) else {
            return Vec::new();
        };
        let session = handle.lock().await;
        if self.is_expired(&session) {
            return Vec::new();
        }
        session.recent()
    }

    /// Remove the session for `key`. Returns whether one existed.
    ///
    /// A turn already in flight finishes against the detached session; the
    /// next message starts from an empty history.
    pub fn clear(&self, key: &str) -> bool {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(key).is_some(),
            Err(e) => {
                warn!(error = %e, "Session lock poisoned, cannot clear");
                false
            }
        }
    }

    /// Drop every idle session past the TTL. Returns how many were removed.
    ///
    /// Sessions whose lock is held (a turn in flight) are kept.
    pub fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Session lock poisoned, skipping sweep");
                return 0;
            }
        };
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !self.is_expired(&session),
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "Swept expired sessions");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn existing(&self, key: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(key).map(Arc::clone))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(message: &str, emotion: EmotionLabel) -> Turn {
        Turn {
            message: message.to_string(),
            reply: format!("reply to {}", message),
            emotion,
        }
    }

    // ---- Summaries ----

    #[test]
    fn test_summarize_empty_is_none() {
        assert_eq!(summarize(&[]), None);
    }

    #[test]
    fn test_zero_summary_turns_is_none() {
        assert_eq!(summarize_messages(["a", "b"], 0), None);

        let mut session = Session::new();
        session.record(turn("something long enough", EmotionLabel::Sadness), 5);
        assert_eq!(session.summary(0), None);
        assert_eq!(session.provisional_summary("pending", 0), None);
    }

    #[test]
    fn test_summarize_takes_last_three() {
        let history = vec![
            turn("a", EmotionLabel::Joy),
            turn("b", EmotionLabel::Joy),
            turn("c", EmotionLabel::Joy),
            turn("d", EmotionLabel::Joy),
        ];
        assert_eq!(summarize(&history).as_deref(), Some("b → c → d"));
    }

    #[test]
    fn test_summarize_fewer_than_three() {
        let history = vec![turn("only one", EmotionLabel::Fear)];
        assert_eq!(summarize(&history).as_deref(), Some("only one"));
    }

    #[test]
    fn test_provisional_summary_includes_pending() {
        let mut session = Session::new();
        session.record(turn("first", EmotionLabel::Sadness), 5);
        session.record(turn("second", EmotionLabel::Sadness), 5);
        session.record(turn("third", EmotionLabel::Sadness), 5);
        assert_eq!(
            session.provisional_summary("fourth", 3).as_deref(),
            Some("second → third → fourth")
        );
        assert_eq!(session.summary(3).as_deref(), Some("first → second → third"));
    }

    #[test]
    fn test_provisional_summary_on_empty_session() {
        let session = Session::new();
        assert_eq!(session.provisional_summary("hello", 3).as_deref(), Some("hello"));
        assert_eq!(session.summary(3), None);
    }

    // ---- Session recording ----

    #[test]
    fn test_record_updates_last_emotion() {
        let mut session = Session::new();
        assert_eq!(session.last_emotion, EmotionLabel::Neutral);
        session.record(turn("ugh", EmotionLabel::Anger), 5);
        assert_eq!(session.last_emotion, EmotionLabel::Anger);
    }

    #[test]
    fn test_record_evicts_fifo() {
        let mut session = Session::new();
        for i in 0..8 {
            session.record(turn(&format!("m{}", i), EmotionLabel::Neutral), 5);
            assert!(session.history.len() <= 5);
        }
        let messages: Vec<String> = session.recent().into_iter().map(|t| t.message).collect();
        assert_eq!(messages, vec!["m3", "m4", "m5", "m6", "m7"]);
    }

    #[test]
    fn test_record_zero_limit_keeps_nothing() {
        let mut session = Session::new();
        session.record(turn("gone", EmotionLabel::Joy), 0);
        assert!(session.history.is_empty());
        assert_eq!(session.last_emotion, EmotionLabel::Joy);
    }

    // ---- Store ----

    #[tokio::test]
    async fn test_get_or_create_fresh_session() {
        let store = SessionStore::default();
        let session = store.get_or_create("u1").await.unwrap();
        assert!(session.history.is_empty());
        assert_eq!(session.last_emotion, EmotionLabel::Neutral);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_recent_without_session_is_empty_and_does_not_create() {
        let store = SessionStore::default();
        assert!(store.get_recent("nobody").await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_record_turn_and_get_recent() {
        let store = SessionStore::default();
        store.record_turn("u1", turn("hi", EmotionLabel::Joy)).await.unwrap();
        store.record_turn("u1", turn("bye", EmotionLabel::Sadness)).await.unwrap();

        let recent = store.get_recent("u1").await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "hi");
        assert_eq!(recent[1].message, "bye");

        let session = store.get_or_create("u1").await.unwrap();
        assert_eq!(session.last_emotion, EmotionLabel::Sadness);
    }

    #[tokio::test]
    async fn test_store_history_never_exceeds_limit() {
        let store = SessionStore::default();
        for i in 0..12 {
            store
                .record_turn("u1", turn(&format!("m{}", i), EmotionLabel::Neutral))
                .await
                .unwrap();
            assert!(store.get_recent("u1").await.len() <= DEFAULT_HISTORY_LIMIT);
        }
        assert_eq!(store.get_recent("u1").await[0].message, "m7");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_by_key() {
        let store = SessionStore::default();
        store.record_turn("u1", turn("mine", EmotionLabel::Joy)).await.unwrap();
        store.record_turn("guest", turn("theirs", EmotionLabel::Fear)).await.unwrap();
        assert_eq!(store.get_recent("u1").await[0].message, "mine");
        assert_eq!(store.get_recent("guest").await[0].message, "theirs");
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let store = SessionStore::default();
        store.record_turn("u1", turn("hi", EmotionLabel::Joy)).await.unwrap();
        assert!(store.clear("u1"));
        assert!(store.get_recent("u1").await.is_empty());
        assert!(!store.clear("u1"));

        let fresh = store.get_or_create("u1").await.unwrap();
        assert!(fresh.history.is_empty());
    }

    #[tokio::test]
    async fn test_handle_returns_same_session() {
        let store = SessionStore::default();
        let a = store.handle("u1").unwrap();
        let b = store.handle("u1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    // ---- Expiry ----

    #[tokio::test]
    async fn test_no_ttl_never_expires() {
        let store = SessionStore::default();
        let handle = store.handle("u1").unwrap();
        handle.lock().await.last_active = Utc::now() - Duration::days(365);
        assert_eq!(store.sweep_expired(), 0);
        assert!(Arc::ptr_eq(&handle, &store.handle("u1").unwrap()));
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced_on_lookup() {
        let store = SessionStore::new(5, 3, Some(Duration::minutes(30)));
        store.record_turn("u1", turn("old", EmotionLabel::Joy)).await.unwrap();
        store.handle("u1").unwrap().lock().await.last_active =
            Utc::now() - Duration::minutes(31);

        let session = store.get_or_create("u1").await.unwrap();
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_has_no_recent_history() {
        let store = SessionStore::new(5, 3, Some(Duration::minutes(30)));
        store.record_turn("u1", turn("old", EmotionLabel::Joy)).await.unwrap();
        assert_eq!(store.get_recent("u1").await.len(), 1);

        store.handle("u1").unwrap().lock().await.last_active =
            Utc::now() - Duration::minutes(31);
        assert!(store.get_recent("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = SessionStore::new(5, 3, Some(Duration::minutes(30)));
        store.record_turn("stale", turn("a", EmotionLabel::Joy)).await.unwrap();
        store.record_turn("fresh", turn("b", EmotionLabel::Joy)).await.unwrap();
        store.handle("stale").unwrap().lock().await.last_active =
            Utc::now() - Duration::hours(2);

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_recent("fresh").await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_locked_sessions() {
        let store = SessionStore::new(5, 3, Some(Duration::minutes(1)));
        let handle = store.handle("busy").unwrap();
        let mut guard = handle.lock().await;
        guard.last_active = Utc::now() - Duration::hours(1);

        assert_eq!(store.sweep_expired(), 0);
        drop(guard);
        assert_eq!(store.sweep_expired(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = ChatConfig {
            history_limit: 4,
            summary_turns: 2,
            session_ttl_minutes: 15,
            max_message_length: 0,
        };
        let store = SessionStore::from_config(&config);
        assert_eq!(store.history_limit(), 4);
        assert_eq!(store.summary_turns(), 2);
        let mut session = Session::new();
        session.last_active = Utc::now() - Duration::minutes(16);
        assert!(store.is_expired(&session));
    }
}
