//! Reply generation.
//!
//! Picks a templated reply for an emotion and, for emotions where it is
//! supportive, appends a clause that refers back to what the user said
//! earlier in the conversation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use solace_core::error::SolaceError;
use solace_core::types::EmotionLabel;

/// Emotions for which a reference to earlier context is offered.
///
/// `anxiety` is not a classifier label today and only matches if the label
/// set grows to include it.
pub const FOLLOW_UP_EMOTIONS: [&str; 9] = [
    "sadness",
    "grief",
    "fear",
    "anger",
    "remorse",
    "disappointment",
    "confusion",
    "nervousness",
    "anxiety",
];

/// Trimmed context must be longer than this many characters to be quoted.
pub const MIN_CONTEXT_CHARS: usize = 10;

// =============================================================================
// RandomSource
// =============================================================================

/// Source of template choices.
pub trait RandomSource: Send + Sync {
    /// Return an index in `0..len`. Callers never pass `len == 0`.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform choice from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Always picks the same position (wrapped to the pool size).
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRandom(pub usize);

impl RandomSource for FixedRandom {
    fn pick(&self, len: usize) -> usize {
        self.0 % len
    }
}

// =============================================================================
// IntentTable
// =============================================================================

/// Operator-curated reply templates keyed by lower-case emotion name.
#[derive(Debug, Clone, Default)]
pub struct IntentTable {
    templates: HashMap<String, Vec<String>>,
}

impl IntentTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `emotion -> [template, ...]`.
    pub fn from_json_str(json: &str) -> Result<Self, SolaceError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        let templates = raw
            .into_iter()
            .map(|(emotion, pool)| (emotion.trim().to_lowercase(), pool))
            .collect();
        Ok(Self { templates })
    }

    pub fn load(path: &Path) -> Result<Self, SolaceError> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&content)?;
        info!(emotions = table.len(), "Loaded intents from {}", path.display());
        Ok(table)
    }

    /// Load the table, or fall back to an empty one so built-in templates apply.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            info!("No intents file at {}, using built-in replies", path.display());
            return Self::empty();
        }
        match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Failed to load intents from {}", path.display());
                Self::empty()
            }
        }
    }

    /// Curated pool for an emotion, if any non-empty one exists.
    pub fn pool(&self, emotion: EmotionLabel) -> Option<&[String]> {
        self.templates
            .get(emotion.as_str())
            .map(Vec::as_slice)
            .filter(|pool| !pool.is_empty())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// =============================================================================
// ResponseGenerator
// =============================================================================

/// Generates empathetic replies.
#[derive(Clone)]
pub struct ResponseGenerator {
    intents: IntentTable,
    random: Arc<dyn RandomSource>,
}

impl ResponseGenerator {
    pub fn new(intents: IntentTable, random: Arc<dyn RandomSource>) -> Self {
        Self { intents, random }
    }

    /// Generator with only the built-in templates and uniform selection.
    pub fn builtin() -> Self {
        Self::new(IntentTable::empty(), Arc::new(ThreadRandom))
    }

    /// Produce a reply for `emotion`, optionally referring to `context`.
    pub fn generate(&self, emotion: EmotionLabel, context: Option<&str>) -> String {
        let base = self.base_reply(emotion);
        match context {
            Some(ctx) if should_follow_up(emotion, ctx) => format!(
                "{} By the way, earlier you mentioned: \"{}\". Is this related?",
                base, ctx
            ),
            _ => base,
        }
    }

    /// Pick a template: curated pool first, then the built-in pool.
    pub fn base_reply(&self, emotion: EmotionLabel) -> String {
        if let Some(pool) = self.intents.pool(emotion) {
            if let Some(reply) = pool.get(self.random.pick(pool.len())) {
                return reply.clone();
            }
        }
        let pool = fallback_templates(emotion);
        pool.get(self.random.pick(pool.len()))
            .copied()
            .unwrap_or(NEUTRAL_REPLY)
            .to_string()
    }
}

/// Whether a context clause should be appended for this emotion and context.
pub fn should_follow_up(emotion: EmotionLabel, context: &str) -> bool {
    FOLLOW_UP_EMOTIONS.contains(&emotion.as_str())
        && context.trim().chars().count() > MIN_CONTEXT_CHARS
}

/// Used when a random source picks outside its pool.
const NEUTRAL_REPLY: &str = "I'm here. What's on your mind?";

/// Built-in templates. Every label has at least one entry.
pub fn fallback_templates(emotion: EmotionLabel) -> &'static [&'static str] {
    match emotion {
        EmotionLabel::Admiration => &["That sounds inspiring. What about it stood out to you?"],
        EmotionLabel::Amusement => &["Glad something made you smile! Want to share it?"],
        EmotionLabel::Anger => &[
            "I hear your frustration. Want to talk about what's upsetting you?",
            "That sounds really maddening. What happened?",
        ],
        EmotionLabel::Annoyance => &["That sounds irritating. What happened?"],
        EmotionLabel::Approval => &["It sounds like you feel good about that. That's great!"],
        EmotionLabel::Caring => &["You sound thoughtful and caring. Want to talk more?"],
        EmotionLabel::Confusion => &["That does sound confusing. Want to walk through it together?"],
        EmotionLabel::Curiosity => &["You sound curious. What are you wondering about?"],
        EmotionLabel::Desire => &["It sounds like you really want this. Want to talk about it?"],
        EmotionLabel::Disappointment => {
            &["That sounds disappointing. Want to share what happened?"]
        }
        EmotionLabel::Disapproval => &["It seems something didn't feel right. What was it?"],
        EmotionLabel::Disgust => &["That sounds unpleasant. Want to tell me what happened?"],
        EmotionLabel::Embarrassment => {
            &["That must have felt awkward. I'm here if you want to talk."]
        }
        EmotionLabel::Excitement => &["That's exciting! Tell me more!"],
        EmotionLabel::Fear => &[
            "That sounds scary. You're not alone. Want to talk about it?",
            "It makes sense to feel afraid. I'm here with you.",
        ],
        EmotionLabel::Gratitude => &["That's kind. What are you feeling grateful for?"],
        EmotionLabel::Grief => &["I'm really sorry you're facing this pain. I'm here for you."],
        EmotionLabel::Joy => &["That's wonderful! Tell me what made you happy!"],
        EmotionLabel::Love => {
            &["It sounds like you're feeling something strong. Want to talk about it?"]
        }
        EmotionLabel::Nervousness => &["You sound tense. Want to talk through it?"],
        EmotionLabel::Optimism => &["I like your hopeful outlook. What makes you feel positive?"],
        EmotionLabel::Pride => &["You sound proud, and you should be! Tell me more."],
        EmotionLabel::Realization => {
            &["That sounds like an important realization. What led to it?"]
        }
        EmotionLabel::Relief => &["I'm glad something eased your stress. Want to talk about it?"],
        EmotionLabel::Remorse => &["It sounds like you feel regret. What happened?"],
        EmotionLabel::Sadness => &[
            "I'm really sorry you're feeling down. Want to talk about it?",
            "That sounds heavy. I'm here to listen.",
        ],
        EmotionLabel::Surprise => &["That sounds surprising! What happened?"],
        EmotionLabel::Neutral => &[NEUTRAL_REPLY],
    }
}

// =============================================================================
// Tests
// =============================================================================
