//! Subsystem construction from a validated config.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::app;
use crate::config::AppConfig;
use crate::http::Dispatcher;
use crate::identity::{PasswordHashError, StaticPasswords};
use crate::secret::Secret;
use crate::session::{RamSessionServer, SessionIdGenerator};
use crate::stream::StreamOptions;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("session.id_key is not hex: {0}")]
    IdKey(#[from] hex::FromHexError),

    #[error(transparent)]
    Password(#[from] PasswordHashError),
}

pub fn session_server(config: &AppConfig) -> Result<RamSessionServer, StartupError> {
    let ids = match &config.session.id_key {
        Some(key) => SessionIdGenerator::new(Secret::new(hex::decode(key)?)),
        None => {
            tracing::warn!("No session.id_key configured; sessions will not survive a restart");
            SessionIdGenerator::ephemeral()
        }
    };
    let options = StreamOptions {
        substream_buffer: config.streaming.substream_buffer,
        fan_in_buffer: config.streaming.fan_in_buffer,
        trace: config.routing.trace,
    };
    Ok(RamSessionServer::new(
        ids,
        Duration::from_secs(config.session.timeout_secs),
        options,
    ))
}

pub fn passwords(config: &AppConfig) -> Result<StaticPasswords, StartupError> {
    if config.auth.users.is_empty() {
        tracing::warn!("No users configured; nobody can log in");
    }
    let mut table = StaticPasswords::new();
    for user in &config.auth.users {
        table = table.with_user(&user.username, &user.password)?;
    }
    Ok(table)
}

pub fn dispatcher(
    config: &AppConfig,
    sessions: Arc<RamSessionServer>,
) -> Result<Dispatcher, StartupError> {
    let routes = app::routes(Arc::new(passwords(config)?), config.cookies.insecure);
    let dispatcher = Dispatcher::new(routes, sessions)
        .with_trace(config.routing.trace)
        .with_insecure_cookies(config.cookies.insecure);
    match serde_json::to_string(&dispatcher.audit()) {
        Ok(table) => tracing::debug!(routes = %table, "Routing table built"),
        Err(e) => tracing::debug!(error = %e, "Cannot describe routing table"),
    }
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Normalized, PasswordAuthenticator};

    #[test]
    fn test_passwords_from_config() {
        let mut config = AppConfig::default();
        config.auth.users.push(crate::config::UserConfig {
            username: "alice".into(),
            password: "wonderland".into(),
        });
        let table = passwords(&config).unwrap();
        let alice = Normalized::new("alice");
        assert!(table.authenticate(&alice, &Normalized::new("wonderland")).is_ok());
        assert!(table.authenticate(&alice, &Normalized::new("nope")).is_err());
    }

    #[test]
    fn test_bad_id_key() {
        let mut config = AppConfig::default();
        config.session.id_key = Some("not hex".into());
        assert!(matches!(session_server(&config), Err(StartupError::IdKey(_))));
    }

    #[test]
    fn test_configured_id_key() {
        let mut config = AppConfig::default();
        config.session.id_key = Some("11".repeat(32));
        let sessions = session_server(&config).unwrap();
        assert!(sessions.is_empty());
    }
}
