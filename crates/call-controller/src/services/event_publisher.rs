//! Outbound business-event fan-out.
//!
//! `publish` is fire-and-forget: the payload is serialised once, then one
//! task per configured endpoint POSTs it with the endpoint's own timeout
//! and HMAC signature. A 2xx response leaves no trace; anything else is
//! recorded in `business_webhook_log`. There is no automatic retry -
//! receivers dedup on `X-Event-ID` and failures are replayed explicitly.
//!
//! The terminal `room.finished` event goes through
//! [`EventPublisher::publish_room_finished_once`], which claims a 24h
//! once-flag in the coordination store before emitting.

use crate::config::WebhookEndpoint;
use crate::observability::metrics;
use crate::redis::{Coordinator, ROOM_FINISHED_TTL};
use crate::repositories::webhook_logs::{WebhookFailure, WebhookLogsRepository};
use chrono::Utc;
use common::secret::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fan-out publisher for business events.
#[derive(Clone)]
pub struct EventPublisher {
    client: reqwest::Client,
    endpoints: Arc<Vec<WebhookEndpoint>>,
    pool: PgPool,
    coordinator: Option<Coordinator>,
    sequence: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Build a publisher over the configured endpoints.
    ///
    /// The HTTP client carries no global timeout; each request runs under
    /// its endpoint's configured timeout instead.
    #[must_use]
    pub fn new(
        endpoints: Vec<WebhookEndpoint>,
        pool: PgPool,
        coordinator: Option<Coordinator>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: Arc::new(endpoints),
            pool,
            coordinator,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to every endpoint without blocking the caller.
    ///
    /// A no-op when no endpoints are configured.
    pub fn publish<T: Serialize>(&self, event_type: &'static str, payload: &T) {
        if self.endpoints.is_empty() {
            return;
        }

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    target: "cc.publisher",
                    event_type,
                    error = %e,
                    "Failed to serialise business event"
                );
                return;
            }
        };

        let event_id = self.next_event_id();
        let timestamp = Utc::now().timestamp();
        let body = Arc::new(body);

        for endpoint in self.endpoints.iter() {
            tokio::spawn(send_to_endpoint(
                self.client.clone(),
                self.pool.clone(),
                endpoint.clone(),
                event_type,
                event_id.clone(),
                timestamp,
                Arc::clone(&body),
            ));
        }
    }

    /// Publish `room.finished`, at most once per room while the
    /// coordination store is reachable.
    pub async fn publish_room_finished_once<T: Serialize>(&self, room_id: &str, payload: &T) {
        if self.endpoints.is_empty() {
            return;
        }

        if let Some(coordinator) = &self.coordinator {
            let key = Coordinator::room_finished_key(room_id);
            if !coordinator.try_claim(&key, ROOM_FINISHED_TTL).await {
                info!(
                    target: "cc.publisher",
                    room_id,
                    "room.finished already sent, suppressing"
                );
                metrics::record_business_event(
                    crate::services::events::event_types::ROOM_FINISHED,
                    "suppressed",
                );
                return;
            }
        }

        self.publish(crate::services::events::event_types::ROOM_FINISHED, payload);
    }

    fn next_event_id(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{nanos}-{seq}")
    }
}

async fn send_to_endpoint(
    client: reqwest::Client,
    pool: PgPool,
    endpoint: WebhookEndpoint,
    event_type: &'static str,
    event_id: String,
    timestamp: i64,
    body: Arc<Vec<u8>>,
) {
    let signature = common::signature::sign(
        endpoint.secret.expose_secret().as_bytes(),
        body.as_slice(),
    );

    let result = client
        .post(&endpoint.url)
        .query(&[("event_type", event_type), ("event_id", event_id.as_str())])
        .header("Content-Type", "application/json")
        .header("X-Event-Type", event_type)
        .header("X-Event-ID", &event_id)
        .header("X-Timestamp", timestamp.to_string())
        .header("X-Signature", signature)
        .body(body.as_slice().to_vec())
        .timeout(Duration::from_secs(endpoint.timeout))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            metrics::record_business_event(event_type, "sent");
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let response_body = response.text().await.unwrap_or_default();
            warn!(
                target: "cc.publisher",
                event_type,
                event_id = %event_id,
                url = %endpoint.url,
                status,
                response = %response_body,
                "Business event delivery rejected"
            );
            metrics::record_business_event(event_type, "rejected");
            log_failure(
                &pool,
                &endpoint.url,
                event_type,
                &event_id,
                i32::from(status),
                &body,
                &response_body,
                &format!("HTTP {status}"),
            )
            .await;
        }
        Err(e) => {
            warn!(
                target: "cc.publisher",
                event_type,
                event_id = %event_id,
                url = %endpoint.url,
                error = %e,
                "Business event delivery failed"
            );
            metrics::record_business_event(event_type, "error");
            log_failure(
                &pool,
                &endpoint.url,
                event_type,
                &event_id,
                0,
                &body,
                "",
                &e.to_string(),
            )
            .await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn log_failure(
    pool: &PgPool,
    url: &str,
    event_type: &str,
    event_id: &str,
    status: i32,
    request: &[u8],
    response: &str,
    error_msg: &str,
) {
    let request = String::from_utf8_lossy(request);
    let failure = WebhookFailure {
        event_type,
        event_id,
        url,
        status,
        request: &request,
        response,
        error: error_msg,
        retry: 0,
    };

    if let Err(e) = WebhookLogsRepository::insert(pool, &failure).await {
        error!(
            target: "cc.publisher",
            event_id,
            error = %e,
            "Failed to record webhook failure"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/call_test")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn test_event_ids_are_unique() {
        let publisher = EventPublisher::new(Vec::new(), lazy_pool(), None);
        let a = publisher.next_event_id();
        let b = publisher.next_event_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_event_id_shape() {
        let publisher = EventPublisher::new(Vec::new(), lazy_pool(), None);
        let id = publisher.next_event_id();

        let (nanos, seq) = id.split_once('-').expect("two segments");
        assert!(nanos.parse::<i64>().is_ok());
        assert!(seq.parse::<u64>().is_ok());
    }
}
