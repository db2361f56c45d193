//! SFU webhook ingestion endpoint.
//!
//! Authenticates the signed callback before anything touches state, then
//! hands the parsed event to the service. The SFU expects the literal
//! `{code: 200, msg: "ok"}` acknowledgement body on success.

use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// `POST /api/v1/webhooks/livekit`
pub async fn sfu_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    if let Err(e) = state.verifier.verify(auth, &body) {
        warn!(target: "cc.webhook", error = %e, "SFU webhook rejected");
        return e
            .into_api_error(&state.config.default_language)
            .into_response();
    }

    let event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(target: "cc.webhook", error = %e, "Unparseable SFU webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": 400, "msg": "invalid event payload" })),
            )
                .into_response();
        }
    };

    match state.service.handle_sfu_event(&event).await {
        Ok(()) => {
            info!(
                target: "cc.webhook",
                event = %event.event,
                event_id = %event.id,
                "SFU event processed"
            );
            Json(json!({ "code": 200, "msg": "ok" })).into_response()
        }
        Err(e) => {
            warn!(
                target: "cc.webhook",
                event = %event.event,
                event_id = %event.id,
                error = %e,
                "SFU event processing failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "code": 500, "msg": "failed to process event" })),
            )
                .into_response()
        }
    }
}
