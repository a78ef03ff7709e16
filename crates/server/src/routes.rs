//! JSON API surface.
//!
//! - `POST /webhook/messages`          — archive an inbound message
//! - `POST /reviews/{id}/resolve`      — apply corrections, activate listing
//! - `POST /reviews/{id}/skip`         — dismiss a review item
//! - `POST /listings/{id}/retry`       — assisted re-extraction with a hint
//! - `GET  /listings/{id}/crossposts`  — same offer in other conversations
//!
//! Webhook signature validation happens at the gateway; the optional
//! `X-Webhook-Token` shared secret only keeps strangers off a directly
//! exposed port.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use tradepost_core::{
    ApplicationError, InterfaceError, Listing, ListingId, ReviewCorrections, ReviewQueueItemId,
};
use tradepost_ingest::{ArchiveOutcome, InboundMessage, MessageArchive};
use tradepost_pipeline::{CrossPostDetector, RetryService, ReviewService};

#[derive(Clone)]
pub struct AppState {
    pub archive: Arc<MessageArchive>,
    pub reviews: Arc<ReviewService>,
    pub retry: Arc<RetryService>,
    pub crossposts: Arc<CrossPostDetector>,
    pub webhook_secret: Option<SecretString>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/messages", post(archive_message))
        .route("/reviews/{id}/resolve", post(resolve_review))
        .route("/reviews/{id}/skip", post(skip_review))
        .route("/listings/{id}/retry", post(retry_listing))
        .route("/listings/{id}/crossposts", get(list_crossposts))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ArchiveResponse {
    outcome: &'static str,
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    #[serde(default)]
    corrections: ReviewCorrections,
    note: Option<String>,
    actor: String,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    listing_id: String,
}

#[derive(Debug, Deserialize)]
struct SkipRequest {
    actor: String,
}

#[derive(Debug, Serialize)]
struct SkipResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct RetryRequest {
    hint: String,
    actor: String,
}

#[derive(Debug, Serialize)]
struct CrossPostsResponse {
    crossposts: Vec<Listing>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    correlation_id: String,
}

/// Application errors rendered as JSON with a fresh correlation id. The
/// detailed message goes to the log; the client sees the user-safe text.
pub struct ApiError(ApplicationError);

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        warn!(
            event_name = "server.request_failed",
            correlation_id = %correlation_id,
            error = %self.0,
            "request failed"
        );

        let interface = self.0.into_interface(correlation_id);
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn archive_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(inbound): Json<InboundMessage>,
) -> Result<Json<ArchiveResponse>, Response> {
    if let Some(secret) = &state.webhook_secret {
        let presented = headers.get("x-webhook-token").and_then(|value| value.to_str().ok());
        if presented != Some(secret.expose_secret()) {
            info!(event_name = "server.webhook_rejected", "webhook token mismatch");
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }
    }

    let outcome = state
        .archive
        .archive(inbound)
        .await
        .map_err(|error| ApiError::from(error).into_response())?;

    let response = match outcome {
        ArchiveOutcome::Archived { message_id } => {
            ArchiveResponse { outcome: "archived", message_id: Some(message_id.0) }
        }
        ArchiveOutcome::AlreadyArchived => {
            ArchiveResponse { outcome: "already_archived", message_id: None }
        }
    };
    Ok(Json(response))
}

async fn resolve_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let listing_id = state
        .reviews
        .resolve(
            &ReviewQueueItemId(id),
            request.corrections,
            request.note,
            &request.actor,
        )
        .await?;
    Ok(Json(ResolveResponse { listing_id: listing_id.0 }))
}

async fn skip_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SkipRequest>,
) -> Result<Json<SkipResponse>, ApiError> {
    state.reviews.skip(&ReviewQueueItemId(id), &request.actor).await?;
    Ok(Json(SkipResponse { status: "skipped" }))
}

async fn retry_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RetryRequest>,
) -> Result<Json<Listing>, ApiError> {
    let listing = state.retry.retry(&ListingId(id), &request.hint, &request.actor).await?;
    Ok(Json(listing))
}

async fn list_crossposts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CrossPostsResponse>, ApiError> {
    let crossposts = state.crossposts.find_crossposts(&ListingId(id)).await?;
    Ok(Json(CrossPostsResponse { crossposts }))
}
