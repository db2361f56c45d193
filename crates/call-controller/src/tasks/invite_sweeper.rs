//! Invite timeout sweep task.
//!
//! The precise per-participant timers live in process memory and are lost
//! on restart. This task periodically scans for `Inviting` rows older than
//! the invite timeout and pushes each through the same timeout transition,
//! closing that gap. Config validation guarantees the sweep interval never
//! exceeds the invite timeout.

use crate::services::RoomService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Run the sweep loop until the cancellation token fires.
#[instrument(skip_all, name = "cc.task.invite_sweeper")]
pub async fn start_invite_sweeper(
    service: Arc<RoomService>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "cc.task.invite_sweeper",
        interval_seconds = interval.as_secs(),
        invite_timeout_seconds = service.invite_timeout().as_secs(),
        "Starting invite sweeper task"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.sweep_expired_invitations().await {
                    Ok(reaped) if reaped > 0 => {
                        info!(
                            target: "cc.task.invite_sweeper",
                            reaped,
                            "Expired overdue invitations"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Keep ticking; the database may recover.
                        error!(
                            target: "cc.task.invite_sweeper",
                            error = %e,
                            "Sweep pass failed"
                        );
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "cc.task.invite_sweeper",
                    "Invite sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "cc.task.invite_sweeper", "Invite sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_token_stops_task() {
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        assert!(cancel_token.is_cancelled());
    }
}
