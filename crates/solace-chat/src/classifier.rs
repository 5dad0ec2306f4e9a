//! Emotion classification gateway.
//!
//! Wraps the external classifier service behind the `EmotionClassifier`
//! trait and converts every failure into the `neutral` label, so a missing
//! or misbehaving classifier never blocks a reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use solace_core::config::ClassifierConfig;
use solace_core::types::EmotionLabel;

use crate::error::ChatError;

/// Raw classifier output, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub emotion: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A service that maps text to an emotion label.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn predict(&self, text: &str) -> Result<Prediction, ChatError>;
}

// =============================================================================
// HttpClassifier
// =============================================================================

/// Classifier reached over HTTP.
///
/// Sends `POST {"text": ...}` and expects `{"emotion": ..., "confidence"?: ...}`.
pub struct HttpClassifier {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::ClassifierUnavailable(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ChatError> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmotionClassifier for HttpClassifier {
    async fn predict(&self, text: &str) -> Result<Prediction, ChatError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ChatError::ClassifierUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::ClassifierUnavailable(format!(
                "classifier returned {}",
                status
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChatError::ClassifierUnavailable(format!("malformed response: {}", e)))?;

        let emotion = body
            .get("emotion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ChatError::ClassifierUnavailable("response has no emotion field".to_string())
            })?;

        Ok(Prediction {
            emotion: emotion.to_string(),
            confidence: body.get("confidence").and_then(|v| v.as_f64()),
        })
    }
}

// =============================================================================
// ClassificationGateway
// =============================================================================

/// Best-effort front for an [`EmotionClassifier`].
///
/// No retries. Failures are logged and mapped to `Neutral`.
#[derive(Clone)]
pub struct ClassificationGateway {
    classifier: Arc<dyn EmotionClassifier>,
}

impl ClassificationGateway {
    pub fn new(classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify `text`. Always returns a label from the fixed enumeration.
    pub async fn classify(&self, text: &str) -> EmotionLabel {
        match self.classifier.predict(text).await {
            Ok(prediction) => {
                let label = EmotionLabel::normalize(&prediction.emotion);
                if label == EmotionLabel::Neutral
                    && !prediction.emotion.trim().eq_ignore_ascii_case("neutral")
                {
                    debug!(raw = %prediction.emotion, "Unrecognised emotion label, using neutral");
                }
                debug!(
                    emotion = %label,
                    confidence = ?prediction.confidence,
                    "Emotion detected"
                );
                label
            }
            Err(e) => {
                warn!(error = %e, "Emotion classification failed, defaulting to neutral");
                EmotionLabel::Neutral
            }
        }
    }
}
