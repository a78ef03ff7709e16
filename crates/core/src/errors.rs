use thiserror::Error;

use crate::domain::{listing::ListingStatus, review::ReviewStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid review item transition from {from:?} to {to:?}")]
    InvalidReviewTransition { from: ReviewStatus, to: ReviewStatus },
    #[error("invalid listing transition from {from:?} to {to:?}")]
    InvalidListingTransition { from: ListingStatus, to: ListingStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("duplicate {kind}: {key}")]
    Duplicate { kind: &'static str, key: String },
    #[error("external service failure: {0}")]
    ExternalService(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed underneath this request. Reload and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Validation(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::NotFound { kind, id } => Self::NotFound {
                message: format!("{kind} `{id}` not found"),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(error @ DomainError::InvalidReviewTransition { .. })
            | ApplicationError::Domain(error @ DomainError::InvalidListingTransition { .. }) => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Duplicate { kind, key } => Self::Conflict {
                message: format!("{kind} `{key}` already exists"),
                correlation_id: unassigned(),
            },
            ApplicationError::ExternalService(message)
            | ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::review::ReviewStatus;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn invalid_review_transition_maps_to_conflict() {
        let interface = ApplicationError::from(DomainError::InvalidReviewTransition {
            from: ReviewStatus::Resolved,
            to: ReviewStatus::Skipped,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Conflict { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn validation_error_maps_to_bad_request_with_user_safe_message() {
        let interface = ApplicationError::Validation("external_id must not be empty".to_owned())
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn not_found_carries_kind_and_id() {
        let interface =
            ApplicationError::NotFound { kind: "listing", id: "L-404".to_owned() }
                .into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref message, .. } if message.contains("L-404")
        ));
    }

    #[test]
    fn external_service_error_maps_to_service_unavailable() {
        let interface = ApplicationError::ExternalService("llm call timed out".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn duplicate_reference_row_maps_to_conflict() {
        let interface =
            ApplicationError::Duplicate { kind: "category", key: "Pipe".to_owned() }
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-5");
    }
}
