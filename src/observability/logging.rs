//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Route panics through the logger with location and backtrace
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and environment (`RUST_LOG` wins)

use std::backtrace::Backtrace;
use std::panic;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::http::panic::panic_message;

/// Install the global tracing subscriber.
pub fn init_logging(
    config: &ObservabilityConfig,
    development: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "portal_api={level},hash_password={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });

    let format = config.log_format.unwrap_or(if development {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Replace the default panic hook with one that logs through tracing.
///
/// The panic is logged inside whatever span is current, so a panicking
/// handler's record carries its request id, method and path.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let backtrace = Backtrace::force_capture();

        tracing::error!(
            panic.message = %panic_message(info.payload()),
            panic.location = %location,
            panic.backtrace = %backtrace,
            "Panic"
        );
    }));
}
