//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the engine's delivery machinery.

/// Broadcast hub fanning events out to per-viewer queues.
pub mod broadcast;

/// Per-viewer snapshot-then-live streaming sessions.
pub mod stream;

/// Simulated feed provider adapter (demo and test feed).
pub mod feed;

/// Configuration loading.
pub mod config;

/// Tracing/logging initialization.
pub mod telemetry;
