//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SessionManager`: owns the one-session-per-symbol invariant
//! - `TickerService`: the add/remove/stream/list operation surface

/// Feed session ownership and the per-symbol event pump.
pub mod sessions;

/// Ticker registration, removal, and streaming surface.
pub mod tickers;

pub use sessions::{SessionConfig, SessionError, SessionManager};
pub use tickers::{TickerResponse, TickerService};
