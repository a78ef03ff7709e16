//! Strict parsing of the model's JSON reply. The wire shape is pinned
//! with `deny_unknown_fields` so schema drift surfaces as a parse
//! failure instead of silently dropped data.

use serde::Deserialize;
use thiserror::Error;

use tradepost_core::domain::extraction::{ExtractedItem, ExtractionResult, Intent};
use tradepost_core::rust_decimal::Decimal;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model response was not valid JSON: {0}")]
    Json(String),
    #[error("model returned unknown intent `{0}`")]
    UnknownIntent(String),
}

pub fn parse_extraction(raw: &str) -> Result<ExtractionResult, ParseError> {
    let body = strip_code_fences(raw);
    let wire: WireExtraction =
        serde_json::from_str(body).map_err(|error| ParseError::Json(error.to_string()))?;

    let intent = Intent::parse(&wire.intent).ok_or(ParseError::UnknownIntent(wire.intent))?;

    Ok(ExtractionResult {
        intent,
        items: wire.items.into_iter().map(ExtractedItem::from).collect(),
        unknown_terms: wire.unknown_terms,
        confidence: clamp_confidence(wire.confidence),
        explanation: wire.explanation,
    })
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Models wrap JSON in markdown fences often enough that stripping them
/// is cheaper than prompting against it.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n']).trim_end().trim_end_matches("```").trim()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireExtraction {
    intent: String,
    #[serde(default)]
    items: Vec<WireItem>,
    #[serde(default)]
    unknown_terms: Vec<String>,
    confidence: f64,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireItem {
    #[serde(default)]
    part_number: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<Decimal>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
}

impl From<WireItem> for ExtractedItem {
    fn from(wire: WireItem) -> Self {
        Self {
            part_number: wire.part_number,
            description: wire.description,
            quantity: wire.quantity,
            unit: wire.unit,
            category: wire.category,
            manufacturer: wire.manufacturer,
            condition: wire.condition,
            price: wire.price,
            currency: wire.currency,
        }
    }
}
