use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use tradepost_core::domain::jargon::{JargonEntry, JargonEntryId};
use tradepost_core::{ApplicationError, AuditRecord};
use tradepost_db::repositories::{AuditLog, JargonRepository, RepositoryError};

/// Grows the jargon dictionary from terms the model could not resolve.
/// New sightings land unverified; only an admin verify makes an entry
/// feed back into the extraction prompt.
pub struct JargonLearner {
    jargon: Arc<dyn JargonRepository>,
    audit: Arc<dyn AuditLog>,
}

impl JargonLearner {
    pub fn new(jargon: Arc<dyn JargonRepository>, audit: Arc<dyn AuditLog>) -> Self {
        Self { jargon, audit }
    }

    /// Records every unknown term from one extraction. A repeated
    /// (acronym, expansion) sighting bumps the usage count; a new one
    /// inserts an unverified row.
    pub async fn learn(&self, unknown_terms: &[String]) -> Result<(), RepositoryError> {
        for term in unknown_terms {
            let (acronym, expansion) = split_term(term);
            if acronym.is_empty() {
                continue;
            }

            let entry = JargonEntry::observed(
                JargonEntryId(Uuid::new_v4().to_string()),
                acronym,
                expansion,
            );
            self.jargon.record_observation(entry).await?;
        }

        if !unknown_terms.is_empty() {
            debug!(
                event_name = "pipeline.jargon_observed",
                terms = unknown_terms.len(),
                "recorded unknown terms"
            );
        }
        Ok(())
    }

    pub async fn verified_glossary(&self) -> Result<Vec<JargonEntry>, RepositoryError> {
        self.jargon.list_verified().await
    }

    /// Admin verification: flips the entry to verified so future prompts
    /// carry its expansion.
    pub async fn verify(
        &self,
        id: &JargonEntryId,
        actor: &str,
    ) -> Result<(), ApplicationError> {
        let flipped = self
            .jargon
            .set_verified(id, true)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        if !flipped {
            return Err(ApplicationError::NotFound { kind: "jargon entry", id: id.0.clone() });
        }

        let record = AuditRecord::new(actor, "jargon.verify", "jargon_entry", id.0.clone());
        self.audit
            .append(record)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        Ok(())
    }
}

/// Terms arrive either bare (`"BNIB"`) or with the model's guessed
/// expansion (`"BNIB = brand new in box"`). A bare term is stored with
/// an empty expansion until a human supplies one.
fn split_term(term: &str) -> (String, String) {
    match term.split_once('=') {
        Some((acronym, expansion)) => {
            (acronym.trim().to_string(), expansion.trim().to_string())
        }
        None => (term.trim().to_string(), String::new()),
    }
}
