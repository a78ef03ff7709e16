use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Sell,
    Want,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sell => "sell",
            Self::Want => "want",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sell" => Some(Self::Sell),
            "want" => Some(Self::Want),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One traded item as the model reported it, before any normalization
/// against the reference vocabularies. Every field is optional: the model
/// only returns what the message actually contains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub condition: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub intent: Intent,
    pub items: Vec<ExtractedItem>,
    pub unknown_terms: Vec<String>,
    pub confidence: f64,
    pub explanation: Option<String>,
}

impl ExtractionResult {
    /// Downgraded result for any model-call or parse failure. Callers of
    /// the extraction engine never see an error from that stage.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unknown,
            items: Vec::new(),
            unknown_terms: Vec::new(),
            confidence: 0.0,
            explanation: Some(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.confidence == 0.0 && self.items.is_empty() && self.intent == Intent::Unknown
    }

    pub fn primary_item(&self) -> Option<&ExtractedItem> {
        self.items.first()
    }
}

/// Serialized snapshot of a listing's current field values, fed back to
/// the model alongside a reviewer hint on assisted retry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub intent: Option<Intent>,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub condition: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
}
