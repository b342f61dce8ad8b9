use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::{
    errors::ServiceError,
    services::webhook_reconciler::{WebhookEnvelope, WebhookOutcome},
    AppState,
};

const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Receive a payment provider notification
///
/// The provider authenticates with a shared callback token. A 2xx response
/// acknowledges the delivery; anything else makes the provider retry, so
/// only ledger-write failures return 5xx.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Processed, duplicate, or unhandled event type"),
        (status = 400, description = "Malformed body or processing failure"),
        (status = 401, description = "Missing or wrong callback token"),
        (status = 500, description = "Ledger write failed, provider should retry")
    ),
    tag = "payments"
)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    // Authenticate before touching the body; an unauthenticated caller
    // learns nothing about what this endpoint accepts.
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing callback token".to_string()))?;

    if !constant_time_eq(
        token.as_bytes(),
        state.config.webhook_callback_token.as_bytes(),
    ) {
        warn!("webhook rejected: callback token mismatch");
        return Err(ServiceError::Unauthorized(
            "invalid callback token".to_string(),
        ));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("malformed webhook body: {e}")))?;
    let envelope: WebhookEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| ServiceError::ValidationError(format!("malformed webhook body: {e}")))?;

    let outcome = state.services.reconciler.ingest(&envelope, payload).await?;

    Ok(match outcome {
        WebhookOutcome::Processed => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        WebhookOutcome::Ignored => {
            (StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response()
        }
        WebhookOutcome::Duplicate => {
            (StatusCode::OK, Json(json!({ "status": "duplicate" }))).into_response()
        }
        WebhookOutcome::Failed(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "failed",
                "code": e.code(),
                "message": e.response_message(),
            })),
        )
            .into_response(),
    })
}

/// Compares tokens without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
