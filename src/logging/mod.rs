//! Logging infrastructure for Gatehouse
//!
//! Structured `tracing` output for the process, plus sinks for flag
//! configuration warnings.

pub mod warnings;

pub use warnings::{
    JsonlWarningSink, MemoryWarningSink, TeeWarningSink, TracingWarningSink, WarningRecord,
    WarningSink,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `gatehouse=<level>,info`.
pub fn init(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gatehouse={},info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
