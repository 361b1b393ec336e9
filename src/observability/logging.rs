//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber. Call once, at startup.
pub fn init_logging(level: &str, format: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gatehouse={level},tower_http={level}")));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()?,
        "pretty" => subscriber.with(fmt::layer().with_target(true)).try_init()?,
        other => return Err(LoggingError::UnknownFormat(other.to_string())),
    }
    Ok(())
}
