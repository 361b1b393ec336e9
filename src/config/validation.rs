//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, buffers > 0)
//! - Check formats serde cannot (addresses, hex keys, paths)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::secret::KEY_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }
    if config.session.timeout_secs == 0 {
        errors.push(ValidationError::new("session.timeout_secs", "must be > 0"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("session.sweep_interval_secs", "must be > 0"));
    }
    if let Some(key) = &config.session.id_key {
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == KEY_LEN => {}
            Ok(bytes) => errors.push(ValidationError::new(
                "session.id_key",
                format!("must be {} bytes, got {}", KEY_LEN, bytes.len()),
            )),
            Err(_) => errors.push(ValidationError::new("session.id_key", "must be hex")),
        }
    }
    if !config.streaming.websocket_path.starts_with('/') {
        errors.push(ValidationError::new("streaming.websocket_path", "must start with '/'"));
    } else if config.streaming.websocket_path == "/" {
        errors.push(ValidationError::new("streaming.websocket_path", "must not be '/'"));
    }
    if config.streaming.substream_buffer == 0 {
        errors.push(ValidationError::new("streaming.substream_buffer", "must be > 0"));
    }
    if config.streaming.fan_in_buffer == 0 {
        errors.push(ValidationError::new("streaming.fan_in_buffer", "must be > 0"));
    }
    if config.auth.users.iter().any(|u| u.username.is_empty()) {
        errors.push(ValidationError::new("auth.users", "username must not be empty"));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", config.observability.log_format),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
