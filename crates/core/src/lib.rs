pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;

pub use audit::AuditRecord;
pub use domain::crosspost::CrossPostSignature;
pub use domain::extraction::{ExtractedItem, ExtractionResult, FieldSnapshot, Intent};
pub use domain::jargon::{JargonEntry, JargonEntryId, JargonSource};
pub use domain::listing::{Listing, ListingId, ListingStatus};
pub use domain::message::{ConversationId, MessageId, RawMessage};
pub use domain::review::{
    ResolutionSnapshot, ReviewCorrections, ReviewQueueItem, ReviewQueueItemId, ReviewReason,
    ReviewStatus, SuggestedValues,
};
pub use domain::rules::{NotificationRule, NotificationRuleId, RuleCriteria};
pub use domain::task::{PipelineTask, PipelineTaskId, TaskKind, TaskState};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use routing::{RouteDecision, RoutingThresholds};

// Re-exported so downstream crates agree on chrono/decimal versions.
pub use chrono;
pub use rust_decimal;
