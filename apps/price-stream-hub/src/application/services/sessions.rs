//! Feed Session Manager
//!
//! Enforces the one-session-per-symbol invariant: at most one upstream
//! feed session exists per active symbol, no matter how many viewers are
//! watching it.
//!
//! # Design
//!
//! `subscribe` reserves the symbol's slot in the session map *before* the
//! provider handshake runs, so a concurrent second subscribe observes
//! `AlreadySubscribed` immediately instead of opening a duplicate session.
//! On success a pump task is spawned per session; it consumes the feed's
//! event channel, writes values into the registry, and publishes broadcast
//! events. A provider-reported fatal error makes the pump tear the whole
//! symbol down (registry entry, broadcast `Removed`, session record)
//! without any caller involvement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedError, FeedEvent, FeedProvider};
use crate::domain::registry::TickerRegistry;
use crate::domain::ticker::{PriceEvent, Symbol};
use crate::infrastructure::broadcast::BroadcastHub;

// =============================================================================
// Configuration
// =============================================================================

/// Session manager tunables.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Upper bound on the provider's readiness handshake.
    pub subscribe_timeout: Duration,
    /// Capacity of each session's feed event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Session establishment error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session for the symbol already exists.
    #[error("already subscribed to {0}")]
    AlreadySubscribed(Symbol),
    /// The provider's readiness handshake did not finish in time.
    #[error("feed handshake for {symbol} timed out after {after:?}")]
    HandshakeTimeout {
        /// Symbol the handshake ran for.
        symbol: Symbol,
        /// Configured timeout that elapsed.
        after: Duration,
    },
    /// The session was unsubscribed while its handshake was in flight.
    #[error("session for {0} was cancelled during handshake")]
    Cancelled(Symbol),
    /// The provider rejected the session.
    #[error(transparent)]
    Provider(#[from] FeedError),
}

// =============================================================================
// Session State
// =============================================================================

/// Record for one symbol's feed session.
///
/// Created in the pending state when the slot is reserved; activated once
/// the provider handshake succeeds.
#[derive(Debug)]
struct SessionHandle {
    subscribed: bool,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn pending() -> Self {
        Self {
            subscribed: false,
            cancel: CancellationToken::new(),
            pump: None,
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Owns the symbol-to-session map and the per-session pump tasks.
pub struct SessionManager {
    provider: Arc<dyn FeedProvider>,
    registry: Arc<TickerRegistry>,
    hub: Arc<BroadcastHub>,
    sessions: DashMap<Symbol, SessionHandle>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a session manager over the given provider and shared state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn FeedProvider>,
        registry: Arc<TickerRegistry>,
        hub: Arc<BroadcastHub>,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            hub,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Open the feed session for `symbol`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadySubscribed`] when a session (or an in-flight
    ///   handshake) for the symbol exists; no state changes.
    /// - [`SessionError::Provider`] / [`SessionError::HandshakeTimeout`] when
    ///   establishment fails; no session is recorded and the caller is
    ///   expected to roll back its registry insertion.
    /// - [`SessionError::Cancelled`] when the reservation was torn down by a
    ///   concurrent unsubscribe while the handshake ran.
    pub async fn subscribe(self: &Arc<Self>, symbol: &Symbol) -> Result<(), SessionError> {
        // Reserve the slot first so concurrent subscribes for the same
        // symbol fail fast. The entry guard must not be held across awaits.
        match self.sessions.entry(symbol.clone()) {
            Entry::Occupied(_) => {
                return Err(SessionError::AlreadySubscribed(symbol.clone()));
            }
            Entry::Vacant(entry) => {
                entry.insert(SessionHandle::pending());
            }
        }

        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity);
        let handshake = timeout(
            self.config.subscribe_timeout,
            self.provider.subscribe(symbol, events_tx),
        )
        .await;

        match handshake {
            Err(_elapsed) => {
                self.sessions.remove(symbol);
                Err(SessionError::HandshakeTimeout {
                    symbol: symbol.clone(),
                    after: self.config.subscribe_timeout,
                })
            }
            Ok(Err(e)) => {
                self.sessions.remove(symbol);
                Err(SessionError::Provider(e))
            }
            Ok(Ok(())) => self.activate(symbol, events_rx).await,
        }
    }

    /// Record the established session and start its pump.
    async fn activate(
        self: &Arc<Self>,
        symbol: &Symbol,
        events_rx: mpsc::Receiver<FeedEvent>,
    ) -> Result<(), SessionError> {
        let Some(mut handle) = self.sessions.get_mut(symbol) else {
            // Torn down by a concurrent unsubscribe mid-handshake; the
            // provider session just opened must not leak.
            if let Err(e) = self.provider.unsubscribe(symbol).await {
                tracing::warn!(%symbol, error = %e, "failed to close orphaned feed session");
            }
            return Err(SessionError::Cancelled(symbol.clone()));
        };

        let cancel = handle.cancel.clone();
        let pump = tokio::spawn(Arc::clone(self).pump(symbol.clone(), events_rx, cancel));
        handle.subscribed = true;
        handle.pump = Some(pump);
        drop(handle);

        tracing::info!(%symbol, "feed session established");
        Ok(())
    }

    /// Close the session for `symbol` if one exists.
    ///
    /// Idempotent: unknown symbols are a silent no-op. Tolerates a
    /// concurrent in-flight value for the same symbol (the pump drops
    /// values once the registry entry is gone).
    pub async fn unsubscribe(&self, symbol: &str) {
        let Some((_, handle)) = self.sessions.remove(symbol) else {
            tracing::debug!(symbol, "unsubscribe for untracked symbol ignored");
            return;
        };

        handle.cancel.cancel();
        if let Err(e) = self.provider.unsubscribe(symbol).await {
            tracing::warn!(symbol, error = %e, "feed session close failed");
        }
        tracing::info!(symbol, "feed session closed");
    }

    /// Close every outstanding session, then shut the provider down.
    ///
    /// Best-effort: individual close failures are logged and skipped.
    pub async fn close_all(&self) {
        let symbols: Vec<Symbol> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            self.unsubscribe(&symbol).await;
        }
        if let Err(e) = self.provider.shutdown().await {
            tracing::warn!(error = %e, "feed provider shutdown failed");
        }
    }

    /// Whether an established session exists for `symbol`.
    #[must_use]
    pub fn has_session(&self, symbol: &str) -> bool {
        self.sessions
            .get(symbol)
            .is_some_and(|handle| handle.subscribed)
    }

    /// Number of recorded sessions (including in-flight handshakes).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // =========================================================================
    // Event Pump
    // =========================================================================

    /// Consume one session's feed events until cancellation, channel close,
    /// or a fatal provider error.
    async fn pump(
        self: Arc<Self>,
        symbol: Symbol,
        mut events: mpsc::Receiver<FeedEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    None => {
                        tracing::debug!(%symbol, "feed event channel closed");
                        break;
                    }
                    Some(FeedEvent::Value(value)) => self.on_value(&symbol, value),
                    Some(FeedEvent::Fatal(reason)) => {
                        self.on_fatal(&symbol, &reason).await;
                        break;
                    }
                },
            }
        }
    }

    /// Apply one observed value: registry update, then broadcast.
    ///
    /// A value for a symbol that is no longer tracked lost the race with a
    /// concurrent removal and is dropped silently.
    fn on_value(&self, symbol: &str, value: Decimal) {
        let now = Utc::now();
        if self.registry.update(symbol, value, now).is_some() {
            self.hub.publish(&PriceEvent::Update {
                symbol: symbol.to_string(),
                value,
                timestamp: now,
                source: self.provider.source().to_string(),
            });
        } else {
            tracing::debug!(symbol, "stale value for removed symbol dropped");
        }
    }

    /// Automatic teardown after a provider-reported fatal error.
    ///
    /// Removes the ticker, broadcasts `Removed`, and drops the session
    /// record; never surfaced to a caller since it is not request-driven.
    async fn on_fatal(&self, symbol: &str, reason: &str) {
        tracing::error!(symbol, reason, "feed session fatal error, removing ticker");

        if self.registry.remove(symbol).is_some() {
            self.hub.publish(&PriceEvent::Removed {
                symbol: symbol.to_string(),
                timestamp: Utc::now(),
                source: self.provider.source().to_string(),
            });
        }

        self.sessions.remove(symbol);
        if let Err(e) = self.provider.unsubscribe(symbol).await {
            tracing::warn!(symbol, error = %e, "feed session close after fatal error failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    use super::*;
    use crate::infrastructure::broadcast::BroadcastConfig;

    /// Scripted in-memory provider: tests push events through the captured
    /// channel senders.
    #[derive(Default)]
    struct ScriptedFeed {
        sinks: Mutex<HashMap<String, mpsc::Sender<FeedEvent>>>,
        fail_subscribe: Mutex<bool>,
        handshake_delay: Mutex<Option<Duration>>,
        shutdowns: Mutex<usize>,
    }

    impl ScriptedFeed {
        fn sink(&self, symbol: &str) -> mpsc::Sender<FeedEvent> {
            self.sinks.lock().get(symbol).cloned().unwrap()
        }

        fn has_sink(&self, symbol: &str) -> bool {
            self.sinks.lock().contains_key(symbol)
        }
    }

    #[async_trait]
    impl FeedProvider for ScriptedFeed {
        async fn validate(&self, _symbol: &str) -> bool {
            true
        }

        async fn subscribe(
            &self,
            symbol: &str,
            events: mpsc::Sender<FeedEvent>,
        ) -> Result<(), FeedError> {
            // Copy out before awaiting; the guard must not live across it.
            let delay = *self.handshake_delay.lock();
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            if *self.fail_subscribe.lock() {
                return Err(FeedError::Subscribe {
                    symbol: symbol.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            self.sinks.lock().insert(symbol.to_string(), events);
            Ok(())
        }

        async fn unsubscribe(&self, symbol: &str) -> Result<(), FeedError> {
            self.sinks.lock().remove(symbol);
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), FeedError> {
            *self.shutdowns.lock() += 1;
            self.sinks.lock().clear();
            Ok(())
        }

        fn source(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        feed: Arc<ScriptedFeed>,
        registry: Arc<TickerRegistry>,
        hub: Arc<BroadcastHub>,
        sessions: Arc<SessionManager>,
    }

    fn setup() -> Harness {
        let feed = Arc::new(ScriptedFeed::default());
        let registry = Arc::new(TickerRegistry::new());
        let hub = Arc::new(BroadcastHub::new(BroadcastConfig::default()));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&feed) as Arc<dyn FeedProvider>,
            Arc::clone(&registry),
            Arc::clone(&hub),
            SessionConfig {
                subscribe_timeout: Duration::from_millis(200),
                event_capacity: 16,
            },
        ));
        Harness {
            feed,
            registry,
            hub,
            sessions,
        }
    }

    #[tokio::test]
    async fn subscribe_records_single_session() {
        let h = setup();
        let symbol = "BTCUSD".to_string();

        h.sessions.subscribe(&symbol).await.unwrap();

        assert!(h.sessions.has_session("BTCUSD"));
        assert_eq!(h.sessions.session_count(), 1);

        let err = h.sessions.subscribe(&symbol).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadySubscribed(s) if s == "BTCUSD"));
        assert_eq!(h.sessions.session_count(), 1);
    }

    #[tokio::test]
    async fn failed_handshake_records_nothing() {
        let h = setup();
        *h.feed.fail_subscribe.lock() = true;

        let err = h.sessions.subscribe(&"BTCUSD".to_string()).await.unwrap_err();

        assert!(matches!(err, SessionError::Provider(_)));
        assert_eq!(h.sessions.session_count(), 0);
    }

    #[tokio::test]
    async fn slow_handshake_times_out() {
        let h = setup();
        *h.feed.handshake_delay.lock() = Some(Duration::from_secs(2));

        let err = h.sessions.subscribe(&"BTCUSD".to_string()).await.unwrap_err();

        assert!(matches!(err, SessionError::HandshakeTimeout { .. }));
        assert_eq!(h.sessions.session_count(), 0);
    }

    #[tokio::test]
    async fn values_flow_into_registry_and_hub() {
        let h = setup();
        let symbol = "BTCUSD".to_string();
        h.registry.register(symbol.clone()).unwrap();
        h.sessions.subscribe(&symbol).await.unwrap();

        let (_viewer, mut queue) = h.hub.register();
        h.feed
            .sink("BTCUSD")
            .send(FeedEvent::Value(Decimal::new(65_000, 0)))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            PriceEvent::Update { ref symbol, value, .. }
                if symbol == "BTCUSD" && value == Decimal::new(65_000, 0)
        ));
        assert!(h.registry.snapshot()[0].has_value());
    }

    #[tokio::test]
    async fn stale_value_for_untracked_symbol_is_dropped() {
        let h = setup();
        let symbol = "BTCUSD".to_string();
        // No registry entry: simulates a value racing a removal.
        h.sessions.subscribe(&symbol).await.unwrap();

        let (_viewer, mut queue) = h.hub.register();
        h.feed
            .sink("BTCUSD")
            .send(FeedEvent::Value(Decimal::ONE))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_millis(150), queue.recv()).await;
        assert!(received.is_err(), "no event expected for untracked symbol");
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn fatal_error_triggers_auto_removal() {
        let h = setup();
        let symbol = "BTCUSD".to_string();
        h.registry.register(symbol.clone()).unwrap();
        h.sessions.subscribe(&symbol).await.unwrap();

        let (_viewer, mut queue) = h.hub.register();
        h.feed
            .sink("BTCUSD")
            .send(FeedEvent::Fatal("upstream page vanished".to_string()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, PriceEvent::Removed { ref symbol, .. } if symbol == "BTCUSD"));

        // Registry and session map must end in lockstep: both empty.
        for _ in 0..50 {
            if h.sessions.session_count() == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(h.registry.is_empty());
        assert_eq!(h.sessions.session_count(), 0);
        assert!(!h.feed.has_sink("BTCUSD"));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let h = setup();
        let symbol = "BTCUSD".to_string();
        h.sessions.subscribe(&symbol).await.unwrap();

        h.sessions.unsubscribe("BTCUSD").await;
        assert_eq!(h.sessions.session_count(), 0);
        assert!(!h.feed.has_sink("BTCUSD"));

        // Second call is a no-op, not an error.
        h.sessions.unsubscribe("BTCUSD").await;
        assert_eq!(h.sessions.session_count(), 0);
    }

    #[tokio::test]
    async fn close_all_drains_sessions_and_shuts_provider_down() {
        let h = setup();
        for symbol in ["BTCUSD", "ETHUSD", "ADAUSD"] {
            h.sessions.subscribe(&symbol.to_string()).await.unwrap();
        }
        assert_eq!(h.sessions.session_count(), 3);

        h.sessions.close_all().await;

        assert_eq!(h.sessions.session_count(), 0);
        assert_eq!(*h.feed.shutdowns.lock(), 1);
    }
}
