use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use log::{error, info, warn};
use std::sync::Arc;

use super::processor::{Applied, ProcessorError};
use super::verify::VerifyError;
use crate::shared::state::AppState;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/identity", post(receive_identity_event))
}

/// Inbound identity-provider webhook: verify the delivery, decode it into
/// a typed event, and apply it to the mirror.
pub async fn receive_identity_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let event = match state.verifier.verify(&headers, &body) {
        Ok(event) => event,
        Err(err) => {
            warn!("rejected webhook delivery: {}", err);
            return (StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let kind = event.kind().to_string();
    let result = tokio::task::spawn_blocking({
        let state = Arc::clone(&state);
        move || state.processor.process(event)
    })
    .await;

    match result {
        Ok(Ok(applied)) => {
            info!("applied {} event", kind);
            applied_response(applied)
        }
        Ok(Err(err)) => processor_failure(&kind, err),
        Err(err) => {
            error!("event processing task failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn applied_response(applied: Applied) -> (StatusCode, String) {
    let (status, message) = match applied {
        Applied::UserCreated => (StatusCode::CREATED, "User created"),
        Applied::UserUpdated => (StatusCode::OK, "User updated"),
        Applied::UserDeleted => (StatusCode::OK, "User deleted"),
        Applied::OrganizationCreated => (StatusCode::CREATED, "Organization created"),
        Applied::OrganizationUpdated => (StatusCode::OK, "Organization updated"),
        Applied::OrganizationDeleted => (StatusCode::OK, "Organization deleted"),
        Applied::InvitationAccepted => (StatusCode::OK, "Organization invitation accepted"),
        Applied::MembershipDeleted => (StatusCode::OK, "Organization membership deleted"),
    };
    (status, message.to_string())
}

fn processor_failure(kind: &str, err: ProcessorError) -> (StatusCode, String) {
    match err {
        // A re-delivered create is recoverable: acknowledge it so the
        // source stops retrying, and keep the mirror as-is.
        ProcessorError::DuplicateEvent(detail) => {
            warn!("duplicate {} delivery acknowledged: {}", kind, detail);
            (StatusCode::OK, "Duplicate delivery acknowledged".to_string())
        }
        ProcessorError::UnhandledEventType(unhandled) => (
            StatusCode::NOT_FOUND,
            format!("Unhandled event type: {}", unhandled),
        ),
        err @ ProcessorError::CreatorNotFound => (StatusCode::NOT_FOUND, err.to_string()),
        err @ (ProcessorError::UserNotFound | ProcessorError::OrganizationNotFound) => {
            error!("failed to process {} event: {}", kind, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process {} event: {}", kind, err),
            )
        }
        err => {
            error!("failed to process {} event: {}", kind, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process {} event", kind),
            )
        }
    }
}
