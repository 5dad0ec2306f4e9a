use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SolaceError};

/// Environment variable that overrides the classifier endpoint.
pub const CLASSIFIER_URL_ENV: &str = "MODEL_API_URL";

/// Top-level configuration for the Solace engine.
///
/// Loaded from `~/.solace/config.toml` by default. Every section falls back
/// to its defaults when omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolaceConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SolaceConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SolaceConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        let (config, error) = Self::load_with_fallback(path);
        if let Some(e) = error {
            warn!(
                "Failed to load config from {}: {}. Using defaults.",
                path.display(),
                e
            );
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default) but hands the load
    /// error back instead of logging it. Used before logging is initialised.
    pub fn load_with_fallback(path: &Path) -> (Self, Option<SolaceError>) {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<SolaceConfig>(&content) {
                Ok(config) => (config, None),
                Err(e) => (Self::default(), Some(SolaceError::from(e))),
            },
            Err(e) => (Self::default(), Some(SolaceError::Io(e))),
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SolaceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply environment overrides (currently `MODEL_API_URL`).
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(CLASSIFIER_URL_ENV) {
            if !url.trim().is_empty() {
                self.classifier.endpoint = url;
            }
        }
    }

    /// Full path of the transcript database, with `~` expanded.
    pub fn transcript_db_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.storage.db_file)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        return PathBuf::from(home).join(rest.trim_start_matches(['/', '\\']));
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the transcript database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.solace/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Emotion classifier endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// URL accepting `POST {"text": ...}` and answering `{"emotion": ...}`.
    pub endpoint: String,
    /// Request timeout in seconds. A timed-out request counts as a failure.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5001/predict".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum number of turns kept per session.
    pub history_limit: usize,
    /// Number of recent messages folded into a context summary.
    pub summary_turns: usize,
    /// Idle minutes before a session is evicted. 0 keeps sessions forever.
    pub session_ttl_minutes: u32,
    /// Maximum accepted message length in characters. 0 means unlimited.
    pub max_message_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 5,
            summary_turns: 3,
            session_ttl_minutes: 0,
            max_message_length: 0,
        }
    }
}

/// Locations of the static lookup tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// JSON file mapping emotion to tiered resource lists.
    pub catalog_path: String,
    /// JSON file mapping emotion to curated reply templates.
    pub intents_path: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            catalog_path: "data/resources.json".to_string(),
            intents_path: "data/intents.json".to_string(),
        }
    }
}

/// Transcript persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist transcripts to SQLite. When false an in-memory store is used.
    pub enabled: bool,
    /// Database file name inside `general.data_dir`.
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_file: "transcripts.db".to_string(),
        }
    }
}
