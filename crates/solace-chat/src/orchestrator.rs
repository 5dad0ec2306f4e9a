//! Conversation orchestrator: central coordinator for a single turn.
//!
//! Sequences classification, context summarization, reply generation,
//! resource lookup, persistence and memory updates. Only invalid input is
//! reported as an error; every other fault produces a degraded outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, error, warn};

use solace_core::types::{
    session_key, EmotionLabel, ResourceDescriptor, Sender, Severity, TranscriptEntry, Turn,
    Utterance,
};
use solace_storage::TranscriptStore;

use crate::classifier::ClassificationGateway;
use crate::context::SessionStore;
use crate::error::ChatError;
use crate::resources::ResourceCatalog;
use crate::response::ResponseGenerator;

/// Reply sent when a turn could not be completed.
pub const DEGRADED_REPLY: &str = "Sorry — I had trouble processing that. Could you try again?";

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub emotion: EmotionLabel,
    pub reply: String,
    pub resources: Vec<ResourceDescriptor>,
    /// Summary of the session history after this turn was recorded.
    pub context_summary: Option<String>,
}

impl TurnReply {
    /// The generic retry prompt with neutral emotion and no resources.
    pub fn degraded() -> Self {
        Self {
            emotion: EmotionLabel::Neutral,
            reply: DEGRADED_REPLY.to_string(),
            resources: Vec::new(),
            context_summary: None,
        }
    }
}

/// Outcome of [`ConversationOrchestrator::process_turn`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The turn ran to completion and was recorded.
    Replied(TurnReply),
    /// Something failed mid-turn; the user gets a retry prompt.
    Degraded {
        #[serde(flatten)]
        reply: TurnReply,
        #[serde(skip)]
        reason: String,
    },
}

impl TurnOutcome {
    pub fn reply(&self) -> &TurnReply {
        match self {
            TurnOutcome::Replied(reply) => reply,
            TurnOutcome::Degraded { reply, .. } => reply,
        }
    }

    pub fn into_reply(self) -> TurnReply {
        match self {
            TurnOutcome::Replied(reply) => reply,
            TurnOutcome::Degraded { reply, .. } => reply,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, TurnOutcome::Degraded { .. })
    }
}

/// Coordinates the per-turn pipeline.
pub struct ConversationOrchestrator {
    gateway: ClassificationGateway,
    sessions: SessionStore,
    generator: ResponseGenerator,
    catalog: Arc<ResourceCatalog>,
    transcripts: Arc<dyn TranscriptStore>,
    max_message_length: usize,
}

impl ConversationOrchestrator {
    pub fn new(
        gateway: ClassificationGateway,
        sessions: SessionStore,
        generator: ResponseGenerator,
        catalog: Arc<ResourceCatalog>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            generator,
            catalog,
            transcripts,
            max_message_length: 0,
        }
    }

    /// Reject messages longer than `limit` characters. 0 disables the check.
    pub fn with_max_message_length(mut self, limit: usize) -> Self {
        self.max_message_length = limit;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one user message at the default severity.
    pub async fn process_turn(
        &self,
        user_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        self.process_turn_with_severity(user_id, message, Severity::General)
            .await
    }

    /// Handle one user message, recommending resources at `severity`.
    pub async fn process_turn_with_severity(
        &self,
        user_id: Option<&str>,
        message: &str,
        severity: Severity,
    ) -> Result<TurnOutcome, ChatError> {
        self.validate(message)?;

        let turn = AssertUnwindSafe(self.run_turn(user_id, message, severity))
            .catch_unwind()
            .await;
        let reason = match turn {
            Ok(Ok(reply)) => return Ok(TurnOutcome::Replied(reply)),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("turn panicked: {}", panic_message(panic.as_ref())),
        };
        error!(error = %reason, session = %session_key(user_id), "Turn failed, sending retry prompt");
        Ok(TurnOutcome::Degraded {
            reply: TurnReply::degraded(),
            reason,
        })
    }

    /// Handle an [`Utterance`].
    pub async fn process_utterance(
        &self,
        utterance: &Utterance,
        severity: Severity,
    ) -> Result<TurnOutcome, ChatError> {
        self.process_turn_with_severity(utterance.user_id.as_deref(), &utterance.text, severity)
            .await
    }

    /// Recent turns held in memory for a user, oldest first.
    pub async fn get_recent_history(&self, user_id: Option<&str>) -> Vec<Turn> {
        self.sessions.get_recent(session_key(user_id)).await
    }

    /// Forget the in-memory context for a user.
    pub fn clear_context(&self, user_id: Option<&str>) {
        if self.sessions.clear(session_key(user_id)) {
            debug!(session = %session_key(user_id), "Context cleared");
        }
    }

    /// Persisted transcript for a user, oldest first.
    pub async fn transcript(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<TranscriptEntry>, ChatError> {
        Ok(self.transcripts.history(user_id).await?)
    }

    /// Delete the persisted transcript for a user.
    pub async fn purge_transcript(&self, user_id: Option<&str>) -> Result<usize, ChatError> {
        Ok(self.transcripts.purge(user_id).await?)
    }

    /// Evict idle sessions past their TTL.
    pub fn sweep_expired_sessions(&self) -> usize {
        self.sessions.sweep_expired()
    }

    // -- Private helpers --

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.max_message_length > 0 && message.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }
        Ok(())
    }

    async fn run_turn(
        &self,
        user_id: Option<&str>,
        message: &str,
        severity: Severity,
    ) -> Result<TurnReply, ChatError> {
        let key = session_key(user_id);
        let handle = self.sessions.handle(key)?;
        // Held until the turn is recorded so turns for one key never interleave.
        let mut session = handle.lock().await;

        let provisional = session.provisional_summary(message, self.sessions.summary_turns());
        let emotion = self.gateway.classify(message).await;
        let reply = self.generator.generate(emotion, provisional.as_deref());
        let resources = self.catalog.recommend(emotion, severity).to_vec();

        self.persist(user_id, message, &reply, emotion).await;

        session.record(
            Turn {
                message: message.to_string(),
                reply: reply.clone(),
                emotion,
            },
            self.sessions.history_limit(),
        );
        let context_summary = session.summary(self.sessions.summary_turns());

        debug!(
            session = %key,
            emotion = %emotion,
            severity = %severity,
            resources = resources.len(),
            history = session.history.len(),
            "Turn processed"
        );

        Ok(TurnReply {
            emotion,
            reply,
            resources,
            context_summary,
        })
    }

    /// Write both halves of the exchange. Failures are logged, not returned.
    async fn persist(&self, user_id: Option<&str>, message: &str, reply: &str, emotion: EmotionLabel) {
        let entries = [
            TranscriptEntry::new(user_id, Sender::User, message, None),
            TranscriptEntry::new(user_id, Sender::Bot, reply, Some(emotion)),
        ];
        if let Err(e) = self.transcripts.append(&entries).await {
            warn!(
                error = %e,
                session = %session_key(user_id),
                "Failed to persist exchange, continuing without it"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use solace_core::error::SolaceError;
    use solace_storage::MemoryTranscriptStore;

    use crate::classifier::{EmotionClassifier, Prediction};
    use crate::resources::ResourceEntry;
    use crate::response::{fallback_templates, FixedRandom, IntentTable};

    /// Returns a fixed label, optionally after a delay.
    struct StubClassifier {
        label: &'static str,
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl StubClassifier {
        fn new(label: &'static str) -> Self {
            Self {
                label,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn slow(label: &'static str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(label)
            }
        }
    }

    #[async_trait]
    impl EmotionClassifier for StubClassifier {
        async fn predict(&self, text: &str) -> Result<Prediction, ChatError> {
            self.calls.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Prediction {
                emotion: self.label.to_string(),
                confidence: Some(0.9),
            })
        }
    }

    struct DownClassifier;

    #[async_trait]
    impl EmotionClassifier for DownClassifier {
        async fn predict(&self, _text: &str) -> Result<Prediction, ChatError> {
            Err(ChatError::ClassifierUnavailable("connection refused".to_string()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl TranscriptStore for BrokenStore {
        async fn append(&self, _entries: &[TranscriptEntry]) -> Result<(), SolaceError> {
            Err(SolaceError::Storage("disk full".to_string()))
        }
        async fn history(&self, _user_id: Option<&str>) -> Result<Vec<TranscriptEntry>, SolaceError> {
            Err(SolaceError::Storage("disk full".to_string()))
        }
        async fn purge(&self, _user_id: Option<&str>) -> Result<usize, SolaceError> {
            Err(SolaceError::Storage("disk full".to_string()))
        }
    }

    fn catalog() -> Arc<ResourceCatalog> {
        Arc::new(ResourceCatalog::from_entries(vec![
            ResourceEntry {
                emotion: "sadness".to_string(),
                severity: Severity::General,
                items: vec![ResourceDescriptor::titled("Reach out to a friend")],
            },
            ResourceEntry {
                emotion: "sadness".to_string(),
                severity: Severity::Crisis,
                items: vec![ResourceDescriptor::titled("Crisis line")],
            },
        ]))
    }

    fn build(
        classifier: Arc<dyn EmotionClassifier>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            ClassificationGateway::new(classifier),
            SessionStore::default(),
            ResponseGenerator::new(IntentTable::empty(), Arc::new(FixedRandom(0))),
            catalog(),
            transcripts,
        )
    }

    fn orchestrator(label: &'static str) -> (ConversationOrchestrator, Arc<MemoryTranscriptStore>) {
        let store = Arc::new(MemoryTranscriptStore::new());
        let orch = build(Arc::new(StubClassifier::new(label)), store.clone());
        (orch, store)
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_empty_message_is_invalid_input() {
        let (orch, store) = orchestrator("sadness");
        let result = orch.process_turn(Some("u1"), "").await;
        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(orch.sessions().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_message_too_long_is_invalid_input() {
        let (orch, _) = orchestrator("joy");
        let orch = orch.with_max_message_length(5);
        let result = orch.process_turn(None, "too long").await;
        assert!(matches!(result, Err(ChatError::MessageTooLong(5))));
        assert!(orch.process_turn(None, "short").await.is_ok());
    }

    #[tokio::test]
    async fn test_whitespace_message_is_accepted() {
        let (orch, _) = orchestrator("neutral");
        let outcome = orch.process_turn(None, "   ").await.unwrap();
        assert!(!outcome.is_degraded());
    }

    // ---- Happy path ----

    #[tokio::test]
    async fn test_process_turn_returns_reply_and_resources() {
        let (orch, _) = orchestrator("sadness");
        let outcome = orch.process_turn(Some("u1"), "hi").await.unwrap();
        let reply = outcome.reply();
        assert_eq!(reply.emotion, EmotionLabel::Sadness);
        assert_eq!(reply.reply, fallback_templates(EmotionLabel::Sadness)[0]);
        assert_eq!(reply.resources[0].title, "Reach out to a friend");
        assert_eq!(reply.context_summary.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_first_long_message_quotes_itself() {
        // The provisional summary already contains the current message
        let (orch, _) = orchestrator("sadness");
        let outcome = orch.process_turn(Some("u1"), "I lost my job").await.unwrap();
        assert!(outcome
            .reply()
            .reply
            .ends_with("earlier you mentioned: \"I lost my job\". Is this related?"));
    }

    #[tokio::test]
    async fn test_provisional_and_post_commit_summaries() {
        let (orch, _) = orchestrator("fear");
        for m in ["one", "two", "three"] {
            orch.process_turn(Some("u1"), m).await.unwrap();
        }
        let outcome = orch.process_turn(Some("u1"), "four").await.unwrap();
        let reply = outcome.reply();
        assert!(reply
            .reply
            .contains("earlier you mentioned: \"two → three → four\""));
        assert_eq!(reply.context_summary.as_deref(), Some("two → three → four"));
    }

    #[tokio::test]
    async fn test_ineligible_emotion_has_no_follow_up() {
        let (orch, _) = orchestrator("joy");
        let outcome = orch.process_turn(Some("u1"), "I got the job offer").await.unwrap();
        assert_eq!(outcome.reply().reply, fallback_templates(EmotionLabel::Joy)[0]);
    }

    #[tokio::test]
    async fn test_severity_selects_tier() {
        let (orch, _) = orchestrator("sadness");
        let outcome = orch
            .process_turn_with_severity(Some("u1"), "help", Severity::Crisis)
            .await
            .unwrap();
        assert_eq!(outcome.reply().resources[0].title, "Crisis line");
    }

    #[tokio::test]
    async fn test_process_utterance_uses_guest_key() {
        let (orch, _) = orchestrator("joy");
        let utterance = Utterance::new("hello there", None);
        orch.process_utterance(&utterance, Severity::General).await.unwrap();
        assert_eq!(orch.get_recent_history(None).await.len(), 1);
        assert_eq!(orch.sessions().get_recent("guest").await.len(), 1);
    }

    // ---- Memory ----

    #[tokio::test]
    async fn test_history_bounded_and_fifo() {
        let (orch, _) = orchestrator("neutral");
        for i in 0..9 {
            orch.process_turn(Some("u1"), &format!("message {}", i)).await.unwrap();
            assert!(orch.get_recent_history(Some("u1")).await.len() <= 5);
        }
        let history = orch.get_recent_history(Some("u1")).await;
        let messages: Vec<&str> = history.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["message 4", "message 5", "message 6", "message 7", "message 8"]
        );
    }

    #[tokio::test]
    async fn test_last_emotion_updated() {
        let (orch, _) = orchestrator("anger");
        orch.process_turn(Some("u1"), "grr").await.unwrap();
        let session = orch.sessions().get_or_create("u1").await.unwrap();
        assert_eq!(session.last_emotion, EmotionLabel::Anger);
    }

    #[tokio::test]
    async fn test_clear_context_then_history_empty() {
        let (orch, _) = orchestrator("joy");
        orch.process_turn(Some("u1"), "hello").await.unwrap();
        orch.clear_context(Some("u1"));
        assert!(orch.get_recent_history(Some("u1")).await.is_empty());
    }

    // ---- Persistence ----

    #[tokio::test]
    async fn test_exchange_persisted_as_two_messages() {
        let (orch, store) = orchestrator("grief");
        orch.process_turn(Some("u1"), "my dog died").await.unwrap();

        let transcript = orch.transcript(Some("u1")).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].text, "my dog died");
        assert_eq!(transcript[0].emotion, None);
        assert_eq!(transcript[1].sender, Sender::Bot);
        assert_eq!(transcript[1].emotion, Some(EmotionLabel::Grief));

        assert_eq!(orch.purge_transcript(Some("u1")).await.unwrap(), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_abort_turn() {
        let orch = build(Arc::new(StubClassifier::new("sadness")), Arc::new(BrokenStore));
        let outcome = orch.process_turn(Some("u1"), "still here?").await.unwrap();
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.reply().emotion, EmotionLabel::Sadness);
        assert_eq!(orch.get_recent_history(Some("u1")).await.len(), 1);
        assert!(orch.transcript(Some("u1")).await.is_err());
    }

    // ---- Failure handling ----

    struct PanickingStore;

    #[async_trait]
    impl TranscriptStore for PanickingStore {
        async fn append(&self, _entries: &[TranscriptEntry]) -> Result<(), SolaceError> {
            panic!("transcript driver fault");
        }
        async fn history(&self, _user_id: Option<&str>) -> Result<Vec<TranscriptEntry>, SolaceError> {
            Ok(Vec::new())
        }
        async fn purge(&self, _user_id: Option<&str>) -> Result<usize, SolaceError> {
            Ok(0)
        }
    }

    struct PanickingRandom;

    impl crate::response::RandomSource for PanickingRandom {
        fn pick(&self, _len: usize) -> usize {
            panic!("random source fault");
        }
    }

    fn assert_degraded(outcome: &TurnOutcome) {
        assert!(outcome.is_degraded());
        let reply = outcome.reply();
        assert_eq!(reply.emotion, EmotionLabel::Neutral);
        assert_eq!(reply.reply, DEGRADED_REPLY);
        assert!(reply.resources.is_empty());
        assert!(reply.context_summary.is_none());
    }

    #[tokio::test]
    async fn test_panicking_store_yields_degraded_outcome() {
        let orch = build(Arc::new(StubClassifier::new("sadness")), Arc::new(PanickingStore));
        let outcome = orch.process_turn(Some("u1"), "are you there?").await.unwrap();
        assert_degraded(&outcome);
        match outcome {
            TurnOutcome::Degraded { reason, .. } => assert!(reason.contains("transcript driver fault")),
            TurnOutcome::Replied(_) => panic!("expected degraded outcome"),
        }
        // The half-finished turn is not committed and the session stays usable.
        assert!(orch.get_recent_history(Some("u1")).await.is_empty());
        let again = orch.process_turn(Some("u1"), "hello?").await.unwrap();
        assert_degraded(&again);
    }

    #[tokio::test]
    async fn test_panicking_generator_yields_degraded_outcome() {
        let orch = ConversationOrchestrator::new(
            ClassificationGateway::new(Arc::new(StubClassifier::new("sadness"))),
            SessionStore::default(),
            ResponseGenerator::new(IntentTable::empty(), Arc::new(PanickingRandom)),
            catalog(),
            Arc::new(MemoryTranscriptStore::new()),
        );
        let outcome = orch.process_turn(None, "I feel low").await.unwrap();
        assert_degraded(&outcome);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static text"), "static text");
        assert_eq!(panic_message(&String::from("owned text")), "owned text");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_classifier_failure_yields_neutral_reply() {
        let orch = build(Arc::new(DownClassifier), Arc::new(MemoryTranscriptStore::new()));
        let outcome = orch.process_turn(Some("u1"), "I feel awful today").await.unwrap();
        assert!(!outcome.is_degraded());
        let reply = outcome.reply();
        assert_eq!(reply.emotion, EmotionLabel::Neutral);
        assert!(!reply.reply.is_empty());
        assert!(reply.resources.is_empty());
    }

    #[test]
    fn test_degraded_reply_shape() {
        let reply = TurnReply::degraded();
        assert_eq!(reply.emotion, EmotionLabel::Neutral);
        assert_eq!(reply.reply, DEGRADED_REPLY);
        assert!(reply.resources.is_empty());
        assert!(reply.context_summary.is_none());
    }

    #[test]
    fn test_outcome_serialization_hides_reason() {
        let outcome = TurnOutcome::Degraded {
            reply: TurnReply::degraded(),
            reason: "session lock poisoned".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["emotion"], "neutral");
        assert!(json.get("reason").is_none());
        assert!(!json.to_string().contains("poisoned"));
    }

    // ---- Concurrency ----

    #[tokio::test]
    async fn test_same_user_turns_are_serialized() {
        let store = Arc::new(MemoryTranscriptStore::new());
        let orch = build(
            Arc::new(StubClassifier::slow("sadness", Duration::from_millis(20))),
            store,
        );
        let (a, b) = tokio::join!(
            orch.process_turn(Some("u1"), "first message"),
            orch.process_turn(Some("u1"), "second message")
        );
        assert!(!a.unwrap().is_degraded());
        assert!(!b.unwrap().is_degraded());

        let history = orch.get_recent_history(Some("u1")).await;
        assert_eq!(history.len(), 2);
        let mut messages: Vec<&str> = history.iter().map(|t| t.message.as_str()).collect();
        messages.sort();
        assert_eq!(messages, vec!["first message", "second message"]);
    }

    #[tokio::test]
    async fn test_classifier_called_once_per_turn() {
        let classifier = Arc::new(StubClassifier::new("joy"));
        let orch = build(classifier.clone(), Arc::new(MemoryTranscriptStore::new()));
        orch.process_turn(None, "one").await.unwrap();
        orch.process_turn(None, "two").await.unwrap();
        assert_eq!(*classifier.calls.lock().unwrap(), vec!["one", "two"]);
    }
}
