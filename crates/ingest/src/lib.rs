//! Webhook intake: normalized payloads and the idempotent message
//! archive that feeds the pipeline queue.

pub mod archive;
pub mod webhook;

pub use archive::{
    ArchiveOutcome, HttpMediaFetcher, MediaError, MediaFetcher, MessageArchive, NoopMediaFetcher,
};
pub use webhook::InboundMessage;
