//! Semantic extraction: prompt assembly, the LLM and embedding HTTP
//! clients, strict response parsing, and the engine that ties them
//! together with a never-fails contract.

pub mod embedding;
pub mod engine;
pub mod llm;
pub mod parse;
pub mod prompt;

pub use embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
pub use engine::ExtractionEngine;
pub use llm::{HttpLlmClient, LlmClient, LlmError, RetryPolicy};
pub use parse::{parse_extraction, ParseError};
