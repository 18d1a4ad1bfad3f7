//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the upstream feed provider.
pub mod ports;

/// Application services for session and ticker management.
pub mod services;
