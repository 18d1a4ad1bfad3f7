//! Tracing Integration
//!
//! Configures the `tracing` subscriber with an env-filter and a compact
//! fmt layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level directives (default: `price_stream_hub=info`)
//!
//! # Usage
//!
//! ```ignore
//! use price_stream_hub::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!("hub starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; repeat initialization is a no-op so tests
/// can call it freely.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "price_stream_hub=info"
            .parse()
            .expect("static directive 'price_stream_hub=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_init_is_a_noop() {
        init();
        init();
    }
}
