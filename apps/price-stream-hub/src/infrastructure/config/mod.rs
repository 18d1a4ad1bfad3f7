//! Configuration Module
//!
//! Configuration loading and dependency injection for the engine binary.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, FeedSettings, HubConfig, SessionSettings, StreamSettings,
};
