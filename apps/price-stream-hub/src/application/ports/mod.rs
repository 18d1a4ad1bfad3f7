//! Port Interfaces
//!
//! Defines the interface (port) for the upstream feed provider following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement
//! this contract; the session manager consumes it.
//!
//! # Design
//!
//! The provider does not call back into the engine with closures. Instead
//! each open session writes [`FeedEvent`]s into a bounded channel handed to
//! it at subscribe time; the session manager's pump task consumes the
//! channel and drives the registry and broadcast hub.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

// =============================================================================
// Events
// =============================================================================

/// Notification pushed by an open feed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new raw value was observed for the session's symbol.
    Value(Decimal),
    /// The session hit an unrecoverable condition and is dead.
    ///
    /// The engine responds with automatic teardown of the session and
    /// removal of the ticker; no further values follow.
    Fatal(String),
}

// =============================================================================
// Errors
// =============================================================================

/// Feed provider operation error.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Session establishment failed.
    #[error("feed subscribe failed for {symbol}: {reason}")]
    Subscribe {
        /// Symbol the session was requested for.
        symbol: String,
        /// Human-readable failure reason.
        reason: String,
    },
    /// Closing a session failed.
    #[error("feed unsubscribe failed for {symbol}: {reason}")]
    Unsubscribe {
        /// Symbol whose session failed to close.
        symbol: String,
        /// Human-readable failure reason.
        reason: String,
    },
    /// Provider-wide shutdown failed.
    #[error("feed shutdown failed: {0}")]
    Shutdown(String),
}

// =============================================================================
// Provider Port
// =============================================================================

/// Upstream data-acquisition collaborator.
///
/// Given a symbol, validates it and, if valid, opens exactly one live
/// session that pushes raw value updates or a terminal error through the
/// supplied channel. The provider performs its own internal readiness
/// handshake inside `subscribe`, which may take seconds and can fail.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Check whether a symbol can be observed at all.
    async fn validate(&self, symbol: &str) -> bool;

    /// Open a live session for `symbol`.
    ///
    /// On success, all subsequent notifications for the symbol arrive on
    /// `events` asynchronously and independently of this call.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Subscribe`] when the readiness handshake fails;
    /// no session exists afterwards.
    async fn subscribe(
        &self,
        symbol: &str,
        events: mpsc::Sender<FeedEvent>,
    ) -> Result<(), FeedError>;

    /// Close the session for `symbol`, releasing its resource.
    ///
    /// Closing a symbol without an open session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Unsubscribe`] when releasing the resource fails.
    async fn unsubscribe(&self, symbol: &str) -> Result<(), FeedError>;

    /// Close all sessions and provider resources; called once at exit.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Shutdown`] when teardown fails.
    async fn shutdown(&self) -> Result<(), FeedError>;

    /// Name of the feed, stamped into every broadcast event.
    fn source(&self) -> &str;
}
