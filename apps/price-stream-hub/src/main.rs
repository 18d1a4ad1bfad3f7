//! Price Stream Hub Binary
//!
//! Starts the subscription & broadcast engine with the simulated feed,
//! registers the configured startup symbols, and logs a demo viewer's
//! stream until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! - `HUB_SYMBOLS`: Comma-separated startup symbols (default: BTCUSD,ETHUSD)
//! - `HUB_VIEWER_QUEUE_CAPACITY`: Per-viewer queue capacity (default: 256)
//! - `HUB_LIVENESS_TICK_MS`: Viewer disconnect poll interval (default: 100)
//! - `HUB_STREAM_CAPACITY`: Outbound stream channel capacity (default: 64)
//! - `FEED_SUBSCRIBE_TIMEOUT_SECS`: Feed handshake timeout (default: 5)
//! - `FEED_EVENT_CAPACITY`: Feed event channel capacity (default: 64)
//! - `FEED_TICK_INTERVAL_MS`: Simulated tick interval (default: 1000)
//! - `FEED_VOLATILITY`: Simulated walk step bound (default: 0.02)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use price_stream_hub::infrastructure::telemetry;
use price_stream_hub::{
    BroadcastHub, FeedProvider, HubConfig, SessionManager, SimulatedFeed, StreamingSession,
    TickerRegistry, TickerService,
};
use tokio::signal;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting price stream hub");

    let config = HubConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let provider: Arc<dyn FeedProvider> = Arc::new(SimulatedFeed::new(config.feed_config()));
    let registry = Arc::new(TickerRegistry::new());
    let hub = Arc::new(BroadcastHub::new(config.broadcast_config()));
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        Arc::clone(&hub),
        config.session_config(),
    ));
    let streamer = StreamingSession::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        provider.source().to_string(),
        config.stream_config(),
    );
    let service = Arc::new(TickerService::new(
        registry,
        hub,
        sessions,
        provider,
        streamer,
    ));

    for symbol in &config.symbols {
        let response = service.add_ticker(symbol).await;
        if !response.success {
            tracing::warn!(%symbol, message = %response.message, "startup symbol rejected");
        }
    }

    // Demo viewer: log the broadcast stream this process produces.
    let viewer_service = Arc::clone(&service);
    let viewer_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        let mut stream = viewer_service.stream_prices();
        loop {
            tokio::select! {
                () = viewer_shutdown.cancelled() => break,
                entry = stream.next() => match entry {
                    Some(entry) if entry.removed => {
                        tracing::info!(symbol = %entry.symbol, "ticker removed from stream");
                    }
                    Some(entry) => {
                        tracing::info!(symbol = %entry.symbol, price = %entry.price, "price update");
                    }
                    None => break,
                },
            }
        }
    });

    tracing::info!("Price stream hub ready");

    await_shutdown(shutdown_token).await;

    service.shutdown().await;
    tracing::info!("Price stream hub stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        symbols = ?config.symbols,
        viewer_queue_capacity = config.broadcast.viewer_queue_capacity,
        feed_tick_ms = config.feed.tick_interval.as_millis(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
