//! Call Controller
//!
//! Entry point for the call control plane. Builds the object graph once at
//! startup - store, coordinator, token minter, event publisher, room
//! service - then serves the HTTP API alongside the invite sweeper task.

use call_controller::config::Config;
use call_controller::observability::metrics::init_metrics_recorder;
use call_controller::redis::Coordinator;
use call_controller::routes::{self, AppState};
use call_controller::services::{EventPublisher, RoomService};
use call_controller::sfu::{TokenMinter, WebhookVerifier};
use call_controller::tasks::start_invite_sweeper;
use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Call Controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if !config.has_sfu_credentials() {
        warn!("SFU credentials are not configured; token minting and webhook auth will fail");
    }
    if config.business_webhook_endpoints.is_empty() {
        info!("No business webhook endpoints configured; events will not be delivered");
    }

    info!(
        bind_address = %config.bind_address,
        invite_timeout_seconds = config.invite_timeout_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        business_webhook_endpoints = config.business_webhook_endpoints.len(),
        "Configuration loaded successfully"
    );

    // Database pool with a statement timeout so queries cannot hang.
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(config.database_url.expose_secret(), 5);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    info!("Database connection established");

    // The coordinator is optional: without it the service still runs, it
    // just loses cross-replica idempotency.
    let coordinator = match Coordinator::connect(config.redis_url.expose_secret()).await {
        Ok(coordinator) => {
            info!("Coordinator connection established");
            Some(coordinator)
        }
        Err(e) => {
            warn!(error = %e, "Coordinator unavailable; continuing without dedup guarantees");
            None
        }
    };

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    let minter = TokenMinter::new(
        config.sfu_api_key.clone(),
        config.sfu_api_secret.clone(),
        config.sfu_client_url.clone(),
    );
    let verifier = WebhookVerifier::new(config.sfu_api_secret.clone());
    let publisher = EventPublisher::new(
        config.business_webhook_endpoints.clone(),
        pool.clone(),
        coordinator.clone(),
    );

    let service = Arc::new(RoomService::new(
        pool.clone(),
        minter,
        publisher,
        coordinator,
        Duration::from_secs(config.invite_timeout_seconds),
        config.default_max_participants,
    ));

    let cancel_token = CancellationToken::new();

    let sweeper_service = Arc::clone(&service);
    let sweeper_interval = Duration::from_secs(config.sweep_interval_seconds);
    let sweeper_token = cancel_token.clone();
    let sweeper_handle = tokio::spawn(async move {
        start_invite_sweeper(sweeper_service, sweeper_interval, sweeper_token).await;
    });

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        service: Arc::clone(&service),
        verifier,
        config,
        metrics_handle,
    });
    let app = routes::build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    info!("Call Controller listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token.clone()));

    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
    }

    cancel_token.cancel();

    info!(
        pending_timers = service.pending_timers(),
        "Waiting for background tasks to complete..."
    );
    if let Err(e) = sweeper_handle.await {
        error!("Invite sweeper task error: {}", e);
    }

    info!("Call Controller shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT) and triggers the
/// cancellation token for coordinated shutdown.
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    cancel_token.cancel();
}

/// Adds statement_timeout to the database URL so queries cannot hang
/// indefinitely.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
