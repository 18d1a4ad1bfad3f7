//! Ticker Registry
//!
//! Source of truth for which symbols are currently active, keyed by
//! normalized symbol. Backed by a sharded concurrent map so operations on
//! distinct symbols never contend, while concurrent registration/removal
//! of the same symbol serializes on its entry.
//!
//! # Invariant
//!
//! A ticker exists here if and only if the session manager holds an open
//! feed session for the same symbol; the two collections are kept in
//! lockstep by the ticker service and the session pump.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;

use crate::domain::ticker::{Symbol, Ticker};

// =============================================================================
// Errors
// =============================================================================

/// Registry operation error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The symbol is already registered.
    #[error("ticker {0} is already tracked")]
    AlreadyTracked(Symbol),
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe registry of active tickers.
#[derive(Debug, Default)]
pub struct TickerRegistry {
    tickers: DashMap<Symbol, Ticker>,
}

impl TickerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new symbol with an empty ticker.
    ///
    /// The insert is atomic: of two concurrent registrations for the same
    /// symbol exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyTracked`] when the symbol is present.
    pub fn register(&self, symbol: Symbol) -> Result<(), RegistryError> {
        match self.tickers.entry(symbol) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyTracked(entry.key().clone())),
            Entry::Vacant(entry) => {
                let ticker = Ticker::new(entry.key().clone());
                entry.insert(ticker);
                Ok(())
            }
        }
    }

    /// Record a new value for a tracked symbol.
    ///
    /// Returns the updated ticker, or `None` when the symbol is absent.
    /// Absence is an expected race (the symbol may have been removed while
    /// the value was in flight) and must be treated as a silent no-op by
    /// callers, not an error.
    pub fn update(&self, symbol: &str, value: Decimal, at: DateTime<Utc>) -> Option<Ticker> {
        let mut entry = self.tickers.get_mut(symbol)?;
        entry.current_value = Some(value);
        entry.last_updated = Some(at);
        Some(entry.clone())
    }

    /// Remove a symbol, returning its last state if it was tracked.
    pub fn remove(&self, symbol: &str) -> Option<Ticker> {
        self.tickers.remove(symbol).map(|(_, ticker)| ticker)
    }

    /// Whether a symbol is currently tracked.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.tickers.contains_key(symbol)
    }

    /// Point-in-time copy of all tickers, sorted ascending by symbol.
    ///
    /// Used to seed newly connected viewers with an initial snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self
            .tickers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tickers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tickers
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    /// Whether no symbols are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
