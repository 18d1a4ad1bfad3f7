//! Ticker Service
//!
//! The engine's operation surface: add a ticker, remove a ticker, open a
//! price stream, list what is tracked. Validation failures are reported as
//! structured responses rather than errors, so any transport can relay
//! them verbatim.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::application::ports::FeedProvider;
use crate::application::services::sessions::SessionManager;
use crate::domain::registry::TickerRegistry;
use crate::domain::ticker::{PriceEvent, Ticker, normalize_symbol};
use crate::infrastructure::broadcast::BroadcastHub;
use crate::infrastructure::stream::{PriceStreamEntry, StreamingSession};

// =============================================================================
// Responses
// =============================================================================

/// Outcome of an add or remove request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerResponse {
    /// Whether the request took effect.
    pub success: bool,
    /// Human-readable confirmation or failure reason.
    pub message: String,
}

impl TickerResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// =============================================================================
// Ticker Service
// =============================================================================

/// Coordinates the registry, session manager, and broadcast hub behind the
/// four engine operations.
pub struct TickerService {
    registry: Arc<TickerRegistry>,
    hub: Arc<BroadcastHub>,
    sessions: Arc<SessionManager>,
    provider: Arc<dyn FeedProvider>,
    streamer: StreamingSession,
}

impl TickerService {
    /// Wire the service over the shared engine state.
    #[must_use]
    pub fn new(
        registry: Arc<TickerRegistry>,
        hub: Arc<BroadcastHub>,
        sessions: Arc<SessionManager>,
        provider: Arc<dyn FeedProvider>,
        streamer: StreamingSession,
    ) -> Self {
        Self {
            registry,
            hub,
            sessions,
            provider,
            streamer,
        }
    }

    /// Start tracking a symbol.
    ///
    /// Normalizes the raw input, validates it against the feed, registers
    /// it, and opens its feed session. The registry insertion is rolled
    /// back when session establishment fails, so a failed add leaves no
    /// trace.
    pub async fn add_ticker(&self, raw: &str) -> TickerResponse {
        let Some(symbol) = normalize_symbol(raw) else {
            return TickerResponse::fail(format!("'{raw}' is not a valid symbol"));
        };

        // Cheap pre-check; the registry insert below is the authoritative
        // duplicate gate.
        if self.registry.contains(&symbol) {
            return TickerResponse::fail(format!("Ticker {symbol} is already tracked"));
        }

        if !self.provider.validate(&symbol).await {
            return TickerResponse::fail(format!("Ticker {symbol} is invalid or not found"));
        }

        if self.registry.register(symbol.clone()).is_err() {
            return TickerResponse::fail(format!("Ticker {symbol} is already tracked"));
        }

        if let Err(e) = self.sessions.subscribe(&symbol).await {
            tracing::warn!(%symbol, error = %e, "feed session establishment failed");
            self.registry.remove(&symbol);
            return TickerResponse::fail(format!("Could not start feed for {symbol}: {e}"));
        }

        tracing::info!(%symbol, "ticker added");
        TickerResponse::ok(format!("Ticker {symbol} added"))
    }

    /// Stop tracking a symbol.
    ///
    /// The registry entry is removed first, then viewers are told, then the
    /// feed session is closed. Any value still in flight from the session
    /// finds no registry entry and is dropped, so no viewer observes an
    /// update after the removal notice.
    pub async fn remove_ticker(&self, raw: &str) -> TickerResponse {
        let Some(symbol) = normalize_symbol(raw) else {
            return TickerResponse::fail(format!("'{raw}' is not a valid symbol"));
        };

        if self.registry.remove(&symbol).is_none() {
            return TickerResponse::fail(format!("Ticker {symbol} is not tracked"));
        }

        self.hub.publish(&PriceEvent::Removed {
            symbol: symbol.clone(),
            timestamp: Utc::now(),
            source: self.provider.source().to_string(),
        });

        self.sessions.unsubscribe(&symbol).await;

        tracing::info!(%symbol, "ticker removed");
        TickerResponse::ok(format!("Ticker {symbol} removed"))
    }

    /// Open a price stream for one viewer: snapshot first, then live events
    /// until the stream is dropped.
    #[must_use]
    pub fn stream_prices(&self) -> ReceiverStream<PriceStreamEntry> {
        self.streamer.open()
    }

    /// Current tracked tickers, sorted by symbol.
    #[must_use]
    pub fn list_tickers(&self) -> Vec<Ticker> {
        self.registry.snapshot()
    }

    /// Close every feed session and shut the provider down.
    pub async fn shutdown(&self) {
        self.sessions.close_all().await;
    }
}
