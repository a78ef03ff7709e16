//! Prompt assembly. The system prompt carries the full reference
//! vocabulary and the verified jargon glossary so the model normalizes
//! against known names instead of inventing its own.

use std::fmt::Write as _;

use tradepost_core::domain::extraction::FieldSnapshot;
use tradepost_core::domain::jargon::JargonEntry;
use tradepost_core::domain::reference::Vocabulary;

pub fn system_prompt(vocabulary: &Vocabulary, jargon: &[JargonEntry]) -> String {
    let mut prompt = String::from(
        "You extract trade listings from industrial-surplus chat messages.\n\
         Classify the sender's intent and pull out the items they offer or seek.\n\
         Respond with a single JSON object and nothing else, following exactly\n\
         this shape:\n\
         {\n\
           \"intent\": \"sell\" | \"want\" | \"unknown\",\n\
           \"items\": [{\"part_number\": string|null, \"description\": string|null,\n\
                      \"quantity\": number|null, \"unit\": string|null,\n\
                      \"category\": string|null, \"manufacturer\": string|null,\n\
                      \"condition\": string|null, \"price\": number|null,\n\
                      \"currency\": string|null}],\n\
           \"unknown_terms\": [string],\n\
           \"confidence\": number between 0 and 1,\n\
           \"explanation\": string|null\n\
         }\n\
         Use null for anything the message does not state. Put acronyms or\n\
         shorthand you cannot resolve into unknown_terms, each either bare\n\
         (\"BNIB\") or with your best guess (\"BNIB = brand new in box\").\n\
         Prefer the names below when a term matches one of them.\n",
    );

    if !vocabulary.categories.is_empty() {
        prompt.push_str("\nKnown categories:\n");
        for category in &vocabulary.categories {
            if category.aliases.is_empty() {
                let _ = writeln!(prompt, "- {}", category.name);
            } else {
                let _ = writeln!(prompt, "- {} (aka {})", category.name, category.aliases.join(", "));
            }
        }
    }

    if !vocabulary.manufacturers.is_empty() {
        prompt.push_str("\nKnown manufacturers:\n");
        for manufacturer in &vocabulary.manufacturers {
            if manufacturer.aliases.is_empty() {
                let _ = writeln!(prompt, "- {}", manufacturer.name);
            } else {
                let _ = writeln!(
                    prompt,
                    "- {} (aka {})",
                    manufacturer.name,
                    manufacturer.aliases.join(", ")
                );
            }
        }
    }

    if !vocabulary.units.is_empty() {
        prompt.push_str("\nKnown units:\n");
        for unit in &vocabulary.units {
            match &unit.abbreviation {
                Some(abbreviation) => {
                    let _ = writeln!(prompt, "- {} ({abbreviation})", unit.name);
                }
                None => {
                    let _ = writeln!(prompt, "- {}", unit.name);
                }
            }
        }
    }

    if !vocabulary.conditions.is_empty() {
        prompt.push_str("\nKnown conditions:\n");
        for condition in &vocabulary.conditions {
            let _ = writeln!(prompt, "- {}", condition.name);
        }
    }

    if !jargon.is_empty() {
        prompt.push_str("\nTrade jargon glossary:\n");
        for entry in jargon {
            let _ = writeln!(prompt, "- {} = {}", entry.acronym, entry.expansion);
        }
    }

    prompt
}

pub fn user_prompt(text: &str) -> String {
    format!("Message:\n{text}")
}

/// Assisted-retry prompt: the message again, the listing's current field
/// values, and the reviewer's correction.
pub fn retry_user_prompt(text: &str, previous: &FieldSnapshot, hint: &str) -> String {
    let snapshot = serde_json::to_string_pretty(previous)
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "Message:\n{text}\n\n\
         Previously extracted values:\n{snapshot}\n\n\
         Reviewer correction: {hint}\n\
         Re-extract the listing taking the correction into account. Return\n\
         only fields you are confident about; leave the rest null."
    )
}
