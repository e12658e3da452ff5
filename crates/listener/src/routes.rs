use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::event::{EventKind, WebhookEvent};
use crate::signature;
use crate::state::ListenerState;

/// `POST /webhook/{provider}`. The provider segment is accepted but not
/// otherwise interpreted — signature verification and event dispatch are
/// provider-agnostic at this layer.
pub async fn webhook(
    State(state): State<ListenerState>,
    Path(_provider): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return (StatusCode::UNAUTHORIZED, "webhooks not configured").into_response();
    };

    let signature_header = headers.get("Signature").and_then(|v| v.to_str().ok());
    if let Err(err) = signature::verify(secret, signature_header, &body) {
        tracing::warn!(error = %err, "webhook signature verification failed");
        return (StatusCode::UNAUTHORIZED, "signature verification failed").into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "malformed webhook event body");
            return (StatusCode::BAD_REQUEST, "malformed event body").into_response();
        }
    };

    let result = match event.kind {
        EventKind::EmailReceived | EventKind::EmailUpdated => match &event.email_id {
            Some(id) => state.engine.sync_one(id).await.map(|_| ()),
            None => {
                tracing::warn!("email.received/updated event missing emailId");
                return StatusCode::BAD_REQUEST.into_response();
            }
        },
        EventKind::EmailDeleted => match &event.email_id {
            Some(id) => state.engine.mark_deleted(id).await.map(|_| ()),
            None => {
                tracing::warn!("email.deleted event missing emailId");
                return StatusCode::BAD_REQUEST.into_response();
            }
        },
        EventKind::MailboxUpdated => state.engine.tick().await.map(|_| ()),
        EventKind::Unknown => {
            tracing::info!("ignoring unrecognized webhook event type");
            return StatusCode::OK.into_response();
        }
    };

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "engine operation failed for webhook event");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncTriggerRequest {
    #[serde(default)]
    pub force: bool,
}

/// `POST /sync/trigger`. Synchronous manual tick; `force` first resets the
/// cursor for a full re-pull.
pub async fn sync_trigger(
    State(state): State<ListenerState>,
    body: Option<Json<SyncTriggerRequest>>,
) -> impl IntoResponse {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);

    if force {
        if let Err(err) = state.engine.reset(None).await {
            tracing::error!(error = %err, "failed to reset cursor for forced sync");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response();
        }
    }

    match state.engine.tick().await {
        Ok(cursor) => (StatusCode::OK, Json(json!({"cursor": cursor}))).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "manual sync trigger failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}

/// `GET /sync/status`. Returns the cursor for this listener's account.
pub async fn sync_status(State(state): State<ListenerState>) -> impl IntoResponse {
    match state.engine.storage().get_cursor(state.engine.account_id()) {
        Ok(Some(cursor)) => (StatusCode::OK, Json(json!({"cursor": cursor}))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "no cursor for this account"}))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response(),
    }
}

/// `GET /health`. Liveness probe backed by the Archive Store's health
/// query — not an excluded metrics surface, an explicitly named C3
/// operation (spec §4.3).
pub async fn health(State(state): State<ListenerState>) -> impl IntoResponse {
    match state.engine.storage().health() {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": report.status.as_str(),
                "account_count": report.account_count,
                "accounts_in_error": report.accounts_in_error,
                "stalest_sync_age_hours": report.stalest_sync_age_hours,
            })),
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response(),
    }
}
