//! Support resource catalog and recommender.
//!
//! The catalog is a static JSON table loaded once at startup:
//!
//! ```json
//! { "anger": { "general": [...], "medium": [...], "crisis": [...] } }
//! ```
//!
//! Items are either plain strings (used as the title) or objects with
//! `title` and optional `description`, `url`, `phone`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use solace_core::error::SolaceError;
use solace_core::types::{EmotionLabel, ResourceDescriptor, Severity};

/// One tiered resource list for one emotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub emotion: String,
    pub severity: Severity,
    pub items: Vec<ResourceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ResourceTiers {
    general: Vec<ResourceDescriptor>,
    medium: Option<Vec<ResourceDescriptor>>,
    crisis: Option<Vec<ResourceDescriptor>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItem {
    Title(String),
    Full(ResourceDescriptor),
}

impl From<RawItem> for ResourceDescriptor {
    fn from(item: RawItem) -> Self {
        match item {
            RawItem::Title(title) => ResourceDescriptor::titled(title),
            RawItem::Full(descriptor) => descriptor,
        }
    }
}

#[derive(Deserialize)]
struct RawTiers {
    #[serde(default)]
    general: Vec<RawItem>,
    #[serde(default)]
    medium: Option<Vec<RawItem>>,
    #[serde(default)]
    crisis: Option<Vec<RawItem>>,
}

impl From<RawTiers> for ResourceTiers {
    fn from(raw: RawTiers) -> Self {
        fn convert(items: Vec<RawItem>) -> Vec<ResourceDescriptor> {
            items.into_iter().map(ResourceDescriptor::from).collect()
        }
        Self {
            general: convert(raw.general),
            medium: raw.medium.map(convert),
            crisis: raw.crisis.map(convert),
        }
    }
}

/// Immutable lookup of resources by emotion and severity.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    entries: HashMap<String, ResourceTiers>,
}

impl ResourceCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog from individual tier lists.
    pub fn from_entries(entries: impl IntoIterator<Item = ResourceEntry>) -> Self {
        let mut map: HashMap<String, ResourceTiers> = HashMap::new();
        for entry in entries {
            let tiers = map.entry(entry.emotion.trim().to_lowercase()).or_default();
            match entry.severity {
                Severity::General => tiers.general = entry.items,
                Severity::Medium => tiers.medium = Some(entry.items),
                Severity::Crisis => tiers.crisis = Some(entry.items),
            }
        }
        Self { entries: map }
    }

    /// Parse the catalog JSON.
    ///
    /// A document that is not a JSON object is an error. Individual
    /// emotions whose value does not match the tier shape are skipped.
    pub fn from_json_str(json: &str) -> Result<Self, SolaceError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or_else(|| {
            SolaceError::Catalog("resource catalog must be a JSON object".to_string())
        })?;

        let mut entries = HashMap::with_capacity(object.len());
        for (emotion, tiers) in object {
            match serde_json::from_value::<RawTiers>(tiers.clone()) {
                Ok(raw) => {
                    entries.insert(emotion.trim().to_lowercase(), ResourceTiers::from(raw));
                }
                Err(e) => warn!(emotion = %emotion, error = %e, "Skipping malformed catalog entry"),
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, SolaceError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;
        info!(emotions = catalog.len(), "Loaded resource catalog from {}", path.display());
        Ok(catalog)
    }

    /// Load the catalog, degrading to an empty one on any failure.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(
                    error = %e,
                    "Resource catalog unavailable at {}, no resources will be recommended",
                    path.display()
                );
                Self::empty()
            }
        }
    }

    /// Resources for `emotion` at `severity`.
    ///
    /// Crisis and medium lists are used only when requested and present;
    /// everything else falls back to the general list. Unknown emotions
    /// yield an empty slice.
    pub fn recommend_raw(&self, emotion: &str, severity: Severity) -> &[ResourceDescriptor] {
        let Some(tiers) = self.entries.get(&emotion.trim().to_lowercase()) else {
            return &[];
        };
        match severity {
            Severity::Crisis => tiers.crisis.as_deref().unwrap_or(tiers.general.as_slice()),
            Severity::Medium => tiers.medium.as_deref().unwrap_or(tiers.general.as_slice()),
            Severity::General => &tiers.general,
        }
    }

    pub fn recommend(&self, emotion: EmotionLabel, severity: Severity) -> &[ResourceDescriptor] {
        self.recommend_raw(emotion.as_str(), severity)
    }

    /// Flatten the catalog into tier lists, sorted by emotion then tier.
    pub fn entries(&self) -> Vec<ResourceEntry> {
        let mut out = Vec::new();
        for (emotion, tiers) in &self.entries {
            out.push(ResourceEntry {
                emotion: emotion.clone(),
                severity: Severity::General,
                items: tiers.general.clone(),
            });
            if let Some(items) = &tiers.medium {
                out.push(ResourceEntry {
                    emotion: emotion.clone(),
                    severity: Severity::Medium,
                    items: items.clone(),
                });
            }
            if let Some(items) = &tiers.crisis {
                out.push(ResourceEntry {
                    emotion: emotion.clone(),
                    severity: Severity::Crisis,
                    items: items.clone(),
                });
            }
        }
        out.sort_by(|a, b| {
            a.emotion
                .cmp(&b.emotion)
                .then_with(|| tier_rank(a.severity).cmp(&tier_rank(b.severity)))
        });
        out
    }

    /// Number of emotions with at least one tier.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn tier_rank(severity: Severity) -> u8 {
    match severity {
        Severity::General => 0,
        Severity::Medium => 1,
        Severity::Crisis => 2,
    }
}
