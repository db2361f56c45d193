//! Cluster-shared coordination store.
//!
//! A thin Redis client used for cross-replica idempotency only:
//!
//! - `webhook:{event_type}:{event_id}` (1h) - SFU callback dedup
//! - `room:finished:sent:{room_id}` (24h) - once-flag for the terminal
//!   `room.finished` business event
//!
//! State correctness never depends on these keys. Every call is bounded to
//! five seconds, and callers degrade to "process/emit anyway and log" when
//! the store is unreachable.
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently; each operation clones it rather than locking.

use std::time::Duration;
use tracing::warn;

/// TTL for SFU webhook dedup keys.
pub const WEBHOOK_DEDUP_TTL: Duration = Duration::from_secs(60 * 60);

/// TTL for the room-finished once-flag.
pub const ROOM_FINISHED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on any single coordinator call.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("coordinator call timed out after {CALL_TIMEOUT:?}")]
    Timeout,
}

/// Shared TTL-KV used for event dedup and once-only flags.
#[derive(Clone)]
pub struct Coordinator {
    connection: redis::aio::MultiplexedConnection,
}

impl Coordinator {
    /// Connect to the coordination store.
    pub async fn connect(redis_url: &str) -> Result<Self, CoordinatorError> {
        // Do not log the URL itself; it may embed credentials.
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }

    /// Atomically set `key` with a TTL if it does not exist.
    ///
    /// Returns `true` when this caller won the flag.
    pub async fn set_if_absent(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs());

        let reply: Option<String> =
            tokio::time::timeout(CALL_TIMEOUT, cmd.query_async(&mut conn))
                .await
                .map_err(|_| CoordinatorError::Timeout)??;

        Ok(reply.is_some())
    }

    /// Whether `key` is present.
    pub async fn exists(&self, key: &str) -> Result<bool, CoordinatorError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);

        let count: i64 = tokio::time::timeout(CALL_TIMEOUT, cmd.query_async(&mut conn))
            .await
            .map_err(|_| CoordinatorError::Timeout)??;

        Ok(count > 0)
    }

    /// Dedup key for an inbound SFU callback.
    #[must_use]
    pub fn webhook_key(event_type: &str, event_id: &str) -> String {
        format!("webhook:{event_type}:{event_id}")
    }

    /// Once-flag key for the terminal room event.
    #[must_use]
    pub fn room_finished_key(room_id: &str) -> String {
        format!("room:finished:sent:{room_id}")
    }

    /// `set_if_absent` that degrades to `true` (proceed) on store failure.
    pub async fn try_claim(&self, key: &str, ttl: Duration) -> bool {
        match self.set_if_absent(key, ttl).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(
                    target: "cc.coordinator",
                    key = %key,
                    error = %e,
                    "Coordinator unavailable, proceeding without idempotency guard"
                );
                true
            }
        }
    }

    /// `exists` that degrades to `false` (not seen) on store failure.
    pub async fn seen(&self, key: &str) -> bool {
        match self.exists(key).await {
            Ok(present) => present,
            Err(e) => {
                warn!(
                    target: "cc.coordinator",
                    key = %key,
                    error = %e,
                    "Coordinator unavailable, treating key as unseen"
                );
                false
            }
        }
    }

    /// Best-effort mark after processing; failures are logged only.
    pub async fn mark(&self, key: &str, ttl: Duration) {
        if let Err(e) = self.set_if_absent(key, ttl).await {
            warn!(
                target: "cc.coordinator",
                key = %key,
                error = %e,
                "Failed to mark key as processed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_key_format() {
        assert_eq!(
            Coordinator::webhook_key("participant_joined", "EV_123"),
            "webhook:participant_joined:EV_123"
        );
    }

    #[test]
    fn test_room_finished_key_format() {
        assert_eq!(
            Coordinator::room_finished_key("r-42"),
            "room:finished:sent:r-42"
        );
    }

    #[test]
    fn test_ttl_constants() {
        assert_eq!(WEBHOOK_DEDUP_TTL, Duration::from_secs(3600));
        assert_eq!(ROOM_FINISHED_TTL, Duration::from_secs(86400));
    }
}
