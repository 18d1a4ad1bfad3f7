//! Simulated Feed Provider
//!
//! An in-process [`FeedProvider`] that synthesizes a random-walk price
//! series per subscribed symbol. Used by the demo binary and as a stand-in
//! wherever no real upstream feed is wired.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use crate::application::ports::{FeedError, FeedEvent, FeedProvider};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the simulated price walk.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedFeedConfig {
    /// Interval between generated values.
    pub tick_interval: Duration,
    /// Maximum relative step per tick (0.02 = +/-2%).
    pub volatility: f64,
}

impl Default for SimulatedFeedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            volatility: 0.02,
        }
    }
}

// =============================================================================
// Simulated Feed
// =============================================================================

/// Synthetic feed: one generator task per open session.
pub struct SimulatedFeed {
    config: SimulatedFeedConfig,
    sessions: Mutex<HashMap<String, CancellationToken>>,
}

impl SimulatedFeed {
    /// Create a feed with the given walk parameters.
    #[must_use]
    pub fn new(config: SimulatedFeedConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a feed with default walk parameters.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(SimulatedFeedConfig::default())
    }

    /// Number of currently open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl FeedProvider for SimulatedFeed {
    async fn validate(&self, symbol: &str) -> bool {
        (3..=12).contains(&symbol.len()) && symbol.chars().all(|c| c.is_ascii_alphanumeric())
    }

    async fn subscribe(
        &self,
        symbol: &str,
        events: mpsc::Sender<FeedEvent>,
    ) -> Result<(), FeedError> {
        let cancel = CancellationToken::new();
        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(symbol) {
                return Err(FeedError::Subscribe {
                    symbol: symbol.to_string(),
                    reason: "session already open".to_string(),
                });
            }
            sessions.insert(symbol.to_string(), cancel.clone());
        }

        tokio::spawn(generate(
            symbol.to_string(),
            events,
            self.config,
            cancel,
        ));
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<(), FeedError> {
        if let Some(cancel) = self.sessions.lock().remove(symbol) {
            cancel.cancel();
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), FeedError> {
        let mut sessions = self.sessions.lock();
        for (_, cancel) in sessions.drain() {
            cancel.cancel();
        }
        Ok(())
    }

    fn source(&self) -> &str {
        "simulated"
    }
}

/// Random-walk generator loop for one symbol.
///
/// Seeds the price from the symbol bytes so distinct symbols walk from
/// distinct levels, then applies a bounded relative step each tick with a
/// 0.01 floor. Exits on cancellation or when the consumer goes away.
async fn generate(
    symbol: String,
    events: mpsc::Sender<FeedEvent>,
    config: SimulatedFeedConfig,
    cancel: CancellationToken,
) {
    let mut price = seed_price(&symbol);
    let mut tick = tokio::time::interval(config.tick_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        // The thread-local rng must not be held across an await point.
        let step = {
            let mut rng = rand::rng();
            rng.random_range(-config.volatility..=config.volatility)
        };
        price = (price * (1.0 + step)).max(0.01);

        let Some(value) = Decimal::from_f64_retain(price).map(|d| d.round_dp(4)) else {
            tracing::warn!(%symbol, price, "unrepresentable simulated price skipped");
            continue;
        };
        if events.send(FeedEvent::Value(value)).await.is_err() {
            break;
        }
    }
    tracing::debug!(%symbol, "simulated feed generator stopped");
}

/// Deterministic starting level derived from the symbol bytes.
fn seed_price(symbol: &str) -> f64 {
    let sum: u32 = symbol.bytes().map(u32::from).sum();
    f64::from(sum % 900 + 100)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;

    fn fast_feed() -> SimulatedFeed {
        SimulatedFeed::new(SimulatedFeedConfig {
            tick_interval: Duration::from_millis(10),
            volatility: 0.02,
        })
    }

    #[tokio::test]
    async fn validate_accepts_plausible_symbols() {
        let feed = fast_feed();
        assert!(feed.validate("BTCUSD").await);
        assert!(feed.validate("ETH").await);
        assert!(!feed.validate("AB").await);
        assert!(!feed.validate("WAYTOOLONGSYMBOL").await);
        assert!(!feed.validate("BTC-USD").await);
        assert!(!feed.validate("").await);
    }

    #[tokio::test]
    async fn session_emits_positive_values() {
        let feed = fast_feed();
        let (tx, mut rx) = mpsc::channel(16);
        feed.subscribe("BTCUSD", tx).await.unwrap();

        for _ in 0..3 {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                FeedEvent::Value(value) => assert!(value >= Decimal::new(1, 2)),
                FeedEvent::Fatal(reason) => panic!("unexpected fatal: {reason}"),
            }
        }

        feed.unsubscribe("BTCUSD").await.unwrap();
        assert_eq!(feed.session_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_rejected() {
        let feed = fast_feed();
        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);

        feed.subscribe("BTCUSD", tx1).await.unwrap();
        let err = feed.subscribe("BTCUSD", tx2).await.unwrap_err();

        assert!(matches!(err, FeedError::Subscribe { symbol, .. } if symbol == "BTCUSD"));
        assert_eq!(feed.session_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_the_generator() {
        let feed = fast_feed();
        let (tx, mut rx) = mpsc::channel(16);
        feed.subscribe("BTCUSD", tx).await.unwrap();
        feed.unsubscribe("BTCUSD").await.unwrap();

        // Drain anything emitted before cancellation; the channel then
        // closes because the generator dropped its sender.
        let closed = timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn shutdown_cancels_every_session() {
        let feed = fast_feed();
        for symbol in ["BTCUSD", "ETHUSD"] {
            let (tx, _rx) = mpsc::channel(16);
            feed.subscribe(symbol, tx).await.unwrap();
        }
        assert_eq!(feed.session_count(), 2);

        feed.shutdown().await.unwrap();
        assert_eq!(feed.session_count(), 0);
    }
}
