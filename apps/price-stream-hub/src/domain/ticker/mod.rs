//! Ticker Types and Broadcast Events
//!
//! Core domain types for the subscription and broadcast engine: the
//! `Ticker` record tracked per active symbol, the `PriceEvent` value
//! fanned out to viewers, and symbol normalization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Types
// =============================================================================

/// A normalized (uppercase) symbol string, e.g. an exchange trading pair.
pub type Symbol = String;

/// Normalize a raw symbol string.
///
/// Trims surrounding whitespace and uppercases. Returns `None` when the
/// result would be empty or contains whitespace; format validation beyond
/// that belongs to the feed provider.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }
    Some(trimmed.to_uppercase())
}

/// One tracked symbol and its last observed value.
///
/// Exists in the [`TickerRegistry`](crate::domain::registry::TickerRegistry)
/// if and only if a feed session for the symbol is open. Created empty on
/// registration; the value fields are written only by the symbol's own
/// session callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticker {
    /// Normalized unique symbol.
    pub symbol: Symbol,
    /// Last observed value, absent until the first feed tick arrives.
    pub current_value: Option<Decimal>,
    /// Timestamp of the last value.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Ticker {
    /// Create an empty ticker for a freshly registered symbol.
    #[must_use]
    pub const fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            current_value: None,
            last_updated: None,
        }
    }

    /// Whether at least one value has been observed.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.current_value.is_some()
    }
}

// =============================================================================
// Broadcast Events
// =============================================================================

/// Immutable event broadcast to every connected viewer.
///
/// Events are value types copied into each viewer's queue; no viewer
/// mutates a shared event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceEvent {
    /// A new value was observed for a tracked symbol.
    Update {
        /// Symbol the value belongs to.
        symbol: Symbol,
        /// The observed value.
        value: Decimal,
        /// When the value was observed.
        timestamp: DateTime<Utc>,
        /// Feed that produced the value.
        source: String,
    },
    /// A symbol was removed from tracking.
    Removed {
        /// Symbol that was removed.
        symbol: Symbol,
        /// When the removal happened.
        timestamp: DateTime<Utc>,
        /// Feed the symbol was tracked on.
        source: String,
    },
}

impl PriceEvent {
    /// The symbol this event refers to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Update { symbol, .. } | Self::Removed { symbol, .. } => symbol,
        }
    }

    /// Whether this is a removal event.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" btcusd "), Some("BTCUSD".to_string()));
        assert_eq!(normalize_symbol("EthUsd"), Some("ETHUSD".to_string()));
    }

    #[test]
    fn normalize_rejects_empty() {
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("   "), None);
    }

    #[test]
    fn normalize_rejects_inner_whitespace() {
        assert_eq!(normalize_symbol("BTC USD"), None);
    }

    #[test]
    fn new_ticker_has_no_value() {
        let ticker = Ticker::new("BTCUSD".to_string());
        assert!(!ticker.has_value());
        assert!(ticker.last_updated.is_none());
    }

    #[test]
    fn event_symbol_accessor() {
        let update = PriceEvent::Update {
            symbol: "BTCUSD".to_string(),
            value: Decimal::new(65_000, 0),
            timestamp: Utc::now(),
            source: "test".to_string(),
        };
        let removed = PriceEvent::Removed {
            symbol: "ETHUSD".to_string(),
            timestamp: Utc::now(),
            source: "test".to_string(),
        };

        assert_eq!(update.symbol(), "BTCUSD");
        assert!(!update.is_removed());
        assert_eq!(removed.symbol(), "ETHUSD");
        assert!(removed.is_removed());
    }
}
