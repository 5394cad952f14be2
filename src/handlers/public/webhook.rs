// handlers/public/webhook.rs - POST /webhooks/payments handler

use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::webhook::SIGNATURE_HEADER;

/// POST /webhooks/payments - Verify a signed payment notification and acknowledge it
///
/// The body is taken raw: the signature covers the exact bytes sent.
/// Payment processing itself happens elsewhere; this route only authenticates
/// the sender.
pub async fn payments_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Value> {
    let Some(verifier) = &state.webhook else {
        return Err(ApiError::service_unavailable("Webhooks are not configured"));
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = verifier.verify(signature, &body, state.clock.now()) {
        tracing::warn!("Rejected webhook delivery: {}", e);
        return Err(ApiError::bad_request_with_code("INVALID_SIGNATURE", e.to_string()));
    }

    let event: Value = serde_json::from_slice(&body).map_err(|e| ApiError::invalid_json(e.to_string()))?;
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
    tracing::info!("Accepted webhook event {}", kind);

    Ok(ApiResponse::success(json!({ "received": true })))
}
