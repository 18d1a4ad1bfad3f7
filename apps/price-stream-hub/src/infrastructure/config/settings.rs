//! Engine Configuration Settings
//!
//! Configuration types for the price stream hub, loaded from environment
//! variables. Every knob has a sensible default; only malformed values
//! that would break invariants (zero capacities) are rejected.

use std::time::Duration;

use crate::application::services::SessionConfig;
use crate::infrastructure::broadcast::BroadcastConfig;
use crate::infrastructure::feed::SimulatedFeedConfig;
use crate::infrastructure::stream::StreamConfig;

/// Broadcast hub settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of each viewer's event queue.
    pub viewer_queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            viewer_queue_capacity: 256,
        }
    }
}

/// Per-viewer streaming session settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Wake-up interval for disconnect detection in the live loop.
    pub liveness_interval: Duration,
    /// Capacity of the outbound channel toward each viewer.
    pub outbound_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_millis(100),
            outbound_capacity: 64,
        }
    }
}

/// Feed session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on the feed's readiness handshake.
    pub subscribe_timeout: Duration,
    /// Capacity of each session's feed event channel.
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

/// Simulated feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Interval between generated values.
    pub tick_interval: Duration,
    /// Maximum relative step per tick (0.02 = +/-2%).
    pub volatility: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            volatility: 0.02,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Symbols registered at startup.
    pub symbols: Vec<String>,
    /// Broadcast hub settings.
    pub broadcast: BroadcastSettings,
    /// Streaming session settings.
    pub stream: StreamSettings,
    /// Feed session settings.
    pub session: SessionSettings,
    /// Simulated feed settings.
    pub feed: FeedSettings,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSD".to_string(), "ETHUSD".to_string()],
            broadcast: BroadcastSettings::default(),
            stream: StreamSettings::default(),
            session: SessionSettings::default(),
            feed: FeedSettings::default(),
        }
    }
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a provided value would break an invariant,
    /// such as a zero queue capacity.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let symbols = std::env::var("HUB_SYMBOLS").map_or(defaults.symbols, |raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        });

        let broadcast = BroadcastSettings {
            viewer_queue_capacity: parse_env_usize(
                "HUB_VIEWER_QUEUE_CAPACITY",
                defaults.broadcast.viewer_queue_capacity,
            ),
        };

        let stream = StreamSettings {
            liveness_interval: parse_env_duration_millis(
                "HUB_LIVENESS_TICK_MS",
                defaults.stream.liveness_interval,
            ),
            outbound_capacity: parse_env_usize(
                "HUB_STREAM_CAPACITY",
                defaults.stream.outbound_capacity,
            ),
        };

        let session = SessionSettings {
            subscribe_timeout: parse_env_duration_secs(
                "FEED_SUBSCRIBE_TIMEOUT_SECS",
                defaults.session.subscribe_timeout,
            ),
            event_capacity: parse_env_usize(
                "FEED_EVENT_CAPACITY",
                defaults.session.event_capacity,
            ),
        };

        let feed = FeedSettings {
            tick_interval: parse_env_duration_millis(
                "FEED_TICK_INTERVAL_MS",
                defaults.feed.tick_interval,
            ),
            volatility: parse_env_f64("FEED_VOLATILITY", defaults.feed.volatility),
        };

        let config = Self {
            symbols,
            broadcast,
            stream,
            session,
            feed,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.viewer_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HUB_VIEWER_QUEUE_CAPACITY".to_string(),
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if self.stream.outbound_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HUB_STREAM_CAPACITY".to_string(),
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if self.session.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FEED_EVENT_CAPACITY".to_string(),
                reason: "capacity must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.feed.volatility) {
            return Err(ConfigError::InvalidValue {
                key: "FEED_VOLATILITY".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Broadcast hub configuration.
    #[must_use]
    pub const fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            viewer_queue_capacity: self.broadcast.viewer_queue_capacity,
        }
    }

    /// Streaming session configuration.
    #[must_use]
    pub const fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            liveness_interval: self.stream.liveness_interval,
            outbound_capacity: self.stream.outbound_capacity,
        }
    }

    /// Feed session manager configuration.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            subscribe_timeout: self.session.subscribe_timeout,
            event_capacity: self.session.event_capacity,
        }
    }

    /// Simulated feed configuration.
    #[must_use]
    pub const fn feed_config(&self) -> SimulatedFeedConfig {
        SimulatedFeedConfig {
            tick_interval: self.feed.tick_interval,
            volatility: self.feed.volatility,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds a value that would break an invariant.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending environment variable.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
