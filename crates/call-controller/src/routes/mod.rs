//! HTTP routes for the call controller.

use crate::config::Config;
use crate::handlers;
use crate::services::RoomService;
use crate::sfu::WebhookVerifier;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
pub struct AppState {
    /// The room/participant state machine.
    pub service: Arc<RoomService>,

    /// Verifier for inbound SFU callbacks.
    pub verifier: WebhookVerifier,

    /// Service configuration.
    pub config: Config,

    /// Render handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
}

/// Build the application router.
///
/// Layer order (bottom-to-top execution): request timeout, then trace
/// logging.
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api/v1/rooms", post(handlers::rooms::create_room))
        .route("/api/v1/rooms/sync", get(handlers::rooms::sync))
        .route("/api/v1/rooms/{room_id}", get(handlers::rooms::get_room))
        .route(
            "/api/v1/rooms/{room_id}/join",
            post(handlers::rooms::join_room),
        )
        .route(
            "/api/v1/rooms/{room_id}/leave",
            post(handlers::rooms::leave_room),
        )
        .route(
            "/api/v1/rooms/{room_id}/invite",
            post(handlers::rooms::invite),
        )
        .route(
            "/api/v1/rooms/{room_id}/participants",
            get(handlers::rooms::list_participants),
        )
        .route(
            "/api/v1/webhooks/livekit",
            post(handlers::webhook::sfu_webhook),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
