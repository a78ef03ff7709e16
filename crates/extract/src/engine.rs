use std::sync::Arc;

use tracing::{debug, warn};

use tradepost_core::domain::extraction::{ExtractionResult, FieldSnapshot};
use tradepost_core::domain::jargon::JargonEntry;
use tradepost_core::domain::reference::Vocabulary;

use crate::llm::LlmClient;
use crate::parse::parse_extraction;
use crate::prompt;

/// Ties prompt assembly, the model call, and strict parsing together.
/// Never returns an error: any failure downgrades to
/// `ExtractionResult::failed` so the pipeline routes it to review
/// instead of retrying forever.
pub struct ExtractionEngine {
    llm: Arc<dyn LlmClient>,
}

impl ExtractionEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn extract(
        &self,
        text: &str,
        vocabulary: &Vocabulary,
        jargon: &[JargonEntry],
    ) -> ExtractionResult {
        let system = prompt::system_prompt(vocabulary, jargon);
        let user = prompt::user_prompt(text);
        self.run(&system, &user).await
    }

    pub async fn extract_with_hint(
        &self,
        text: &str,
        previous: &FieldSnapshot,
        hint: &str,
        vocabulary: &Vocabulary,
        jargon: &[JargonEntry],
    ) -> ExtractionResult {
        let system = prompt::system_prompt(vocabulary, jargon);
        let user = prompt::retry_user_prompt(text, previous, hint);
        self.run(&system, &user).await
    }

    async fn run(&self, system: &str, user: &str) -> ExtractionResult {
        let raw = match self.llm.complete_json(system, user).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "extract.engine.call_failed",
                    error = %error,
                    "llm call failed; downgrading to zero-confidence result"
                );
                return ExtractionResult::failed(format!("llm call failed: {error}"));
            }
        };

        match parse_extraction(&raw) {
            Ok(result) => {
                debug!(
                    event_name = "extract.engine.completed",
                    intent = result.intent.as_str(),
                    confidence = result.confidence,
                    items = result.items.len(),
                    unknown_terms = result.unknown_terms.len(),
                    "extraction parsed"
                );
                result
            }
            Err(error) => {
                warn!(
                    event_name = "extract.engine.parse_failed",
                    error = %error,
                    "model reply did not parse; downgrading to zero-confidence result"
                );
                ExtractionResult::failed(format!("model reply did not parse: {error}"))
            }
        }
    }
}
