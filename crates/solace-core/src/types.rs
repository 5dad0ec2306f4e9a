use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session key used when a message arrives without a user identity.
pub const GUEST_KEY: &str = "guest";

// =============================================================================
// Enums
// =============================================================================

/// Emotional label assigned to an utterance.
///
/// The 27 GoEmotions categories plus `Neutral`, which doubles as the
/// fallback for anything the classifier returns that is not recognised.
/// Serialized as the lower-case name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmotionLabel {
    Admiration,
    Amusement,
    Anger,
    Annoyance,
    Approval,
    Caring,
    Confusion,
    Curiosity,
    Desire,
    Disappointment,
    Disapproval,
    Disgust,
    Embarrassment,
    Excitement,
    Fear,
    Gratitude,
    Grief,
    Joy,
    Love,
    Nervousness,
    Optimism,
    Pride,
    Realization,
    Relief,
    Remorse,
    Sadness,
    Surprise,
    #[default]
    Neutral,
}

impl EmotionLabel {
    /// Every label, in declaration order.
    pub const ALL: [EmotionLabel; 28] = [
        EmotionLabel::Admiration,
        EmotionLabel::Amusement,
        EmotionLabel::Anger,
        EmotionLabel::Annoyance,
        EmotionLabel::Approval,
        EmotionLabel::Caring,
        EmotionLabel::Confusion,
        EmotionLabel::Curiosity,
        EmotionLabel::Desire,
        EmotionLabel::Disappointment,
        EmotionLabel::Disapproval,
        EmotionLabel::Disgust,
        EmotionLabel::Embarrassment,
        EmotionLabel::Excitement,
        EmotionLabel::Fear,
        EmotionLabel::Gratitude,
        EmotionLabel::Grief,
        EmotionLabel::Joy,
        EmotionLabel::Love,
        EmotionLabel::Nervousness,
        EmotionLabel::Optimism,
        EmotionLabel::Pride,
        EmotionLabel::Realization,
        EmotionLabel::Relief,
        EmotionLabel::Remorse,
        EmotionLabel::Sadness,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    /// Lower-case name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Admiration => "admiration",
            EmotionLabel::Amusement => "amusement",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Annoyance => "annoyance",
            EmotionLabel::Approval => "approval",
            EmotionLabel::Caring => "caring",
            EmotionLabel::Confusion => "confusion",
            EmotionLabel::Curiosity => "curiosity",
            EmotionLabel::Desire => "desire",
            EmotionLabel::Disappointment => "disappointment",
            EmotionLabel::Disapproval => "disapproval",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Embarrassment => "embarrassment",
            EmotionLabel::Excitement => "excitement",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Gratitude => "gratitude",
            EmotionLabel::Grief => "grief",
            EmotionLabel::Joy => "joy",
            EmotionLabel::Love => "love",
            EmotionLabel::Nervousness => "nervousness",
            EmotionLabel::Optimism => "optimism",
            EmotionLabel::Pride => "pride",
            EmotionLabel::Realization => "realization",
            EmotionLabel::Relief => "relief",
            EmotionLabel::Remorse => "remorse",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Map a raw classifier label onto the enumeration.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unknown or empty input becomes `Neutral`.
    pub fn normalize(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == lowered)
            .unwrap_or(EmotionLabel::Neutral)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EmotionLabel {
    fn from(raw: &str) -> Self {
        EmotionLabel::normalize(raw)
    }
}

impl From<String> for EmotionLabel {
    fn from(raw: String) -> Self {
        EmotionLabel::normalize(&raw)
    }
}

impl From<EmotionLabel> for String {
    fn from(label: EmotionLabel) -> Self {
        label.as_str().to_string()
    }
}

/// Escalation level used to pick a resource list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    #[serde(alias = "low")]
    General,
    Medium,
    #[serde(alias = "high")]
    Crisis,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::General => "general",
            Severity::Medium => "medium",
            Severity::Crisis => "crisis",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" | "low" => Ok(Severity::General),
            "medium" => Ok(Severity::Medium),
            "crisis" | "high" => Ok(Severity::Crisis),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Author of a persisted transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            other => Err(format!("unknown sender: {}", other)),
        }
    }
}

// =============================================================================
// Conversation records
// =============================================================================

/// A single incoming message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            user_id,
        }
    }

    /// Session key for this utterance: the user id, or [`GUEST_KEY`].
    pub fn session_key(&self) -> &str {
        session_key(self.user_id.as_deref())
    }
}

/// Resolve the session key for an optional user id.
pub fn session_key(user_id: Option<&str>) -> &str {
    user_id.unwrap_or(GUEST_KEY)
}

/// One message / reply / emotion triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub message: String,
    pub reply: String,
    pub emotion: EmotionLabel,
}

/// A persisted transcript message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    /// `None` for guest conversations.
    pub user_id: Option<String>,
    pub sender: Sender,
    pub text: String,
    pub emotion: Option<EmotionLabel>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Build a new entry stamped with the current time.
    pub fn new(
        user_id: Option<&str>,
        sender: Sender,
        text: impl Into<String>,
        emotion: Option<EmotionLabel>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.map(str::to_string),
            sender,
            text: text.into(),
            emotion,
            created_at: Utc::now(),
        }
    }
}

/// A support resource recommended to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ResourceDescriptor {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: None,
            phone: None,
        }
    }
}
