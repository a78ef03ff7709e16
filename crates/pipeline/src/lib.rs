//! The asynchronous half of the system: the durable task queue and its
//! worker pool, the per-message orchestrator, jargon learning,
//! notification matching, the review workflow, assisted retry, and
//! cross-post detection.

pub mod crosspost;
pub mod jargon;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod review;
pub mod worker;

pub use crosspost::CrossPostDetector;
pub use jargon::JargonLearner;
pub use notify::{NoopDispatcher, NotificationDispatcher, NotificationMatcher, WebhookDispatcher};
pub use orchestrator::Orchestrator;
pub use queue::{BackoffPolicy, TaskQueue};
pub use retry::RetryService;
pub use review::ReviewService;
pub use worker::{TaskFailure, TaskHandler, WorkerPool};
