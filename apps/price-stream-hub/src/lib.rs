#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Price Stream Hub - Subscription & Broadcast Engine
//!
//! Tracks a dynamic set of ticker symbols, maintains exactly one upstream
//! feed session per symbol, and fans live price updates out to any number
//! of concurrently connected viewers over isolated per-viewer queues.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core types with no async machinery
//!   - `ticker`: Symbols, tracked tickers, broadcast events
//!   - `registry`: The concurrent tracked-ticker map
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The upstream feed provider interface
//!   - `services`: Session management and the ticker operation surface
//!
//! - **Infrastructure**: Adapters and delivery machinery
//!   - `broadcast`: Per-viewer queue fan-out
//!   - `stream`: Snapshot-then-live viewer sessions
//!   - `feed`: Simulated feed provider
//!   - `config`: Configuration loading
//!   - `telemetry`: Tracing initialization
//!
//! # Data Flow
//!
//! ```text
//! Feed session 1 --+
//!                  |    +-----------+    +-----------+--> Viewer 1
//! Feed session 2 --+--->| Registry  |--->| Broadcast |--> Viewer 2
//!                  |    | + Pumps   |    |    Hub    |--> Viewer N
//! Feed session M --+    +-----------+    +-----------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ticker types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and delivery machinery.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::registry::{RegistryError, TickerRegistry};
pub use domain::ticker::{PriceEvent, Symbol, Ticker, normalize_symbol};

// Ports
pub use application::ports::{FeedError, FeedEvent, FeedProvider};

// Services
pub use application::services::{
    SessionConfig, SessionError, SessionManager, TickerResponse, TickerService,
};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{BroadcastConfig, BroadcastHub, ViewerId};

// Streaming sessions
pub use infrastructure::stream::{PriceStreamEntry, StreamConfig, StreamingSession, format_price};

// Simulated feed
pub use infrastructure::feed::{SimulatedFeed, SimulatedFeedConfig};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FeedSettings, HubConfig, SessionSettings, StreamSettings,
};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
