//! Domain Layer - Core ticker types and business logic.
//!
//! This layer contains the core domain types for price tracking and
//! broadcasting with no I/O dependencies. All types here are pure Rust
//! with serialization support.

/// Ticker value types, symbol normalization, and broadcast events.
pub mod ticker;

/// Registry of active tickers and their latest prices.
pub mod registry;
