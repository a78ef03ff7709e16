use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JargonEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JargonSource {
    Llm,
    Human,
    Seed,
}

impl JargonSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Human => "human",
            Self::Seed => "seed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "llm" => Some(Self::Llm),
            "human" => Some(Self::Human),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

/// Acronym -> expansion mapping used to pre-expand trade jargon before
/// extraction. Unique on (acronym, expansion), case-insensitive. Only
/// verified entries feed the extraction prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JargonEntry {
    pub id: JargonEntryId,
    pub acronym: String,
    pub expansion: String,
    pub source: JargonSource,
    pub confidence: f64,
    pub usage_count: u32,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JargonEntry {
    /// Unverified entry recorded the first time the model reports an
    /// unknown term.
    pub fn observed(
        id: JargonEntryId,
        acronym: impl Into<String>,
        expansion: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            acronym: acronym.into(),
            expansion: expansion.into(),
            source: JargonSource::Llm,
            confidence: 0.5,
            usage_count: 1,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}
