//! Streaming Sessions
//!
//! One `StreamingSession` per connected viewer: emits an initial snapshot
//! of every symbol that already has a known value, then a live tail of
//! broadcast events, until the viewer disconnects.
//!
//! # State machine
//!
//! `Starting -> Snapshotting -> Live -> Closed`. Registration with the
//! broadcast hub happens before the snapshot is read, so no event published
//! between snapshot and live tail is ever lost; an event landing in that
//! window may be delivered twice (snapshot value plus queued update), which
//! is preferred over a gap. The `Closed` transition
//! (hub unregistration) runs on every exit path, including error paths and
//! caller cancellation.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::registry::TickerRegistry;
use crate::domain::ticker::{PriceEvent, Ticker};
use crate::infrastructure::broadcast::BroadcastHub;

// =============================================================================
// Wire Entry
// =============================================================================

/// One element of a viewer's outbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceStreamEntry {
    /// Normalized symbol.
    pub symbol: String,
    /// Decimal string with two fraction digits; empty for removals.
    pub price: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Feed that produced the entry.
    pub source: String,
    /// Whether the symbol was removed from tracking.
    pub removed: bool,
}

/// Format a price as a decimal string with exactly two fraction digits.
///
/// Midpoints round away from zero, so `12.345` renders as `"12.35"`.
#[must_use]
pub fn format_price(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

impl PriceStreamEntry {
    fn from_event(event: &PriceEvent) -> Self {
        match event {
            PriceEvent::Update {
                symbol,
                value,
                timestamp,
                source,
            } => Self {
                symbol: symbol.clone(),
                price: format_price(*value),
                timestamp: timestamp.timestamp_millis(),
                source: source.clone(),
                removed: false,
            },
            PriceEvent::Removed {
                symbol,
                timestamp,
                source,
            } => Self {
                symbol: symbol.clone(),
                price: String::new(),
                timestamp: timestamp.timestamp_millis(),
                source: source.clone(),
                removed: true,
            },
        }
    }

    /// Snapshot entry for a ticker with a known value, `None` otherwise.
    fn from_ticker(ticker: &Ticker, source: &str) -> Option<Self> {
        let value = ticker.current_value?;
        let at = ticker.last_updated?;
        Some(Self {
            symbol: ticker.symbol.clone(),
            price: format_price(value),
            timestamp: at.timestamp_millis(),
            source: source.to_string(),
            removed: false,
        })
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Streaming session tunables.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Bounded wake-up interval of the live loop; affects only the tail
    /// latency of disconnect detection, never correctness.
    pub liveness_interval: Duration,
    /// Capacity of the outbound channel toward the viewer.
    pub outbound_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_millis(100),
            outbound_capacity: 64,
        }
    }
}

// =============================================================================
// Streaming Session
// =============================================================================

/// Factory for per-viewer outbound streams.
#[derive(Debug)]
pub struct StreamingSession {
    registry: Arc<TickerRegistry>,
    hub: Arc<BroadcastHub>,
    source: String,
    config: StreamConfig,
}

impl StreamingSession {
    /// Create a streaming session factory over the shared engine state.
    #[must_use]
    pub fn new(
        registry: Arc<TickerRegistry>,
        hub: Arc<BroadcastHub>,
        source: String,
        config: StreamConfig,
    ) -> Self {
        Self {
            registry,
            hub,
            source,
            config,
        }
    }

    /// Open the event stream for one viewer.
    ///
    /// Dropping the returned stream cancels the session; the backing task
    /// notices within one liveness interval and unregisters from the hub.
    #[must_use]
    pub fn open(&self) -> ReceiverStream<PriceStreamEntry> {
        let (viewer_id, queue) = self.hub.register();
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);

        let registry = Arc::clone(&self.registry);
        let hub = Arc::clone(&self.hub);
        let source = self.source.clone();
        let config = self.config;

        tokio::spawn(async move {
            run_session(&registry, queue, tx, &source, config).await;
            // Closed: runs on every exit path of the session loop.
            hub.unregister(viewer_id);
            tracing::debug!(viewer_id, "streaming session closed");
        });

        ReceiverStream::new(rx)
    }
}

/// Snapshot-then-live loop for one viewer.
async fn run_session(
    registry: &TickerRegistry,
    mut queue: mpsc::Receiver<PriceEvent>,
    tx: mpsc::Sender<PriceStreamEntry>,
    source: &str,
    config: StreamConfig,
) {
    // Snapshotting: replay current values, sorted by symbol. Symbols with
    // no observed value yet are skipped rather than sent as placeholders.
    for ticker in registry.snapshot() {
        let Some(entry) = PriceStreamEntry::from_ticker(&ticker, source) else {
            continue;
        };
        if tx.send(entry).await.is_err() {
            return;
        }
    }

    // Live: drain the queue in arrival order, waking on enqueue,
    // disconnect, or the bounded liveness tick. No busy waiting.
    let mut tick = tokio::time::interval(config.liveness_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = queue.recv() => match event {
                Some(event) => {
                    if tx.send(PriceStreamEntry::from_event(&event)).await.is_err() {
                        return;
                    }
                }
                // Hub side closed (viewer was unregistered elsewhere).
                None => return,
            },
            () = tx.closed() => return,
            _ = tick.tick() => {
                if tx.is_closed() {
                    return;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::infrastructure::broadcast::BroadcastConfig;

    fn setup() -> (Arc<TickerRegistry>, Arc<BroadcastHub>, StreamingSession) {
        let registry = Arc::new(TickerRegistry::new());
        let hub = Arc::new(BroadcastHub::new(BroadcastConfig::default()));
        let streamer = StreamingSession::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            "test".to_string(),
            StreamConfig {
                liveness_interval: Duration::from_millis(20),
                outbound_capacity: 16,
            },
        );
        (registry, hub, streamer)
    }

    #[test]
    fn price_formatting_two_fraction_digits() {
        assert_eq!(format_price(Decimal::new(65_000, 0)), "65000.00");
        assert_eq!(format_price(Decimal::new(12_345, 1)), "1234.50");
        assert_eq!(format_price(Decimal::new(12_345, 3)), "12.35");
    }

    #[test]
    fn price_formatting_rounds_midpoints_away_from_zero() {
        assert_eq!(format_price(Decimal::new(5, 3)), "0.01");
        assert_eq!(format_price(Decimal::new(25, 3)), "0.03");
        assert_eq!(format_price(Decimal::new(-12_345, 3)), "-12.35");
    }

    #[test]
    fn removed_entry_has_empty_price() {
        let entry = PriceStreamEntry::from_event(&PriceEvent::Removed {
            symbol: "BTCUSD".to_string(),
            timestamp: Utc::now(),
            source: "test".to_string(),
        });
        assert!(entry.removed);
        assert!(entry.price.is_empty());
    }

    #[tokio::test]
    async fn snapshot_skips_symbols_without_values() {
        let (registry, _hub, streamer) = setup();
        registry.register("AAAUSD".to_string()).unwrap();
        registry.register("BBBUSD".to_string()).unwrap();
        registry.update("AAAUSD", Decimal::new(10, 0), Utc::now());

        let mut stream = streamer.open();

        let first = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.symbol, "AAAUSD");
        assert_eq!(first.price, "10.00");
        assert!(!first.removed);

        // BBBUSD has no value: nothing further arrives.
        let next = timeout(Duration::from_millis(100), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn live_events_follow_the_snapshot() {
        let (registry, hub, streamer) = setup();
        registry.register("BTCUSD".to_string()).unwrap();
        let now = Utc::now();
        registry.update("BTCUSD", Decimal::new(64_000, 0), now);

        let mut stream = streamer.open();
        let snapshot = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.price, "64000.00");

        hub.publish(&PriceEvent::Update {
            symbol: "BTCUSD".to_string(),
            value: Decimal::new(65_000, 0),
            timestamp: Utc::now(),
            source: "test".to_string(),
        });

        let live = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.price, "65000.00");
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters_the_viewer() {
        let (_registry, hub, streamer) = setup();

        let stream = streamer.open();
        assert_eq!(hub.viewer_count(), 1);

        drop(stream);

        // The backing task notices within one liveness interval.
        for _ in 0..50 {
            if hub.viewer_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.viewer_count(), 0);
    }

    #[tokio::test]
    async fn wire_shape_is_stable() {
        let entry = PriceStreamEntry {
            symbol: "BTCUSD".to_string(),
            price: "65000.00".to_string(),
            timestamp: 1_700_000_000_000,
            source: "test".to_string(),
            removed: false,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["symbol"], "BTCUSD");
        assert_eq!(json["price"], "65000.00");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["removed"], false);
    }
}
