//! In-memory session store.
//!
//! # Responsibilities
//! - Hold live sessions keyed by ID
//! - Slide each session's expiry forward on every successful lookup
//! - Drop expired sessions on lookup and from a periodic sweeper
//!
//! # Design Decisions
//! - `tokio::time::Instant` so expiry follows a paused test clock
//! - Per-session streams live in a DashMap; the session never holds a lock
//!   across a stream operation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::identity::Identity;
use crate::observability::metrics;
use crate::secret::{
    random_token, AuthenticationUnwrapper, AuthenticationUnwrappers, OsSecrets, Secret,
    SecretSource,
};
use crate::stream::{Stream, StreamOptions};

use super::{Session, SessionError, SessionId, SessionIdGenerator, SessionServer, STREAM_ID_PART};

const STREAM_ID_BYTES: usize = 32;

/// A session held in memory.
pub struct RamSession {
    id: SessionId,
    identity: Identity,
    secret: Secret,
    timeout: Duration,
    expires_at: Mutex<Instant>,
    expired: AtomicBool,
    streams: DashMap<String, Stream>,
    stream_options: StreamOptions,
}

impl RamSession {
    fn new(
        id: SessionId,
        identity: Identity,
        secret: Secret,
        timeout: Duration,
        stream_options: StreamOptions,
    ) -> Self {
        Self {
            id,
            identity,
            secret,
            timeout,
            expires_at: Mutex::new(Instant::now() + timeout),
            expired: AtomicBool::new(false),
            streams: DashMap::new(),
            stream_options,
        }
    }

    fn refresh(&self) {
        let mut expires_at = self.expires_at.lock().unwrap();
        *expires_at = Instant::now() + self.timeout;
    }
}

impl Session for RamSession {
    fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst) || Instant::now() >= *self.expires_at.lock().unwrap()
    }

    fn expire(&self) {
        if self.expired.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<String> = self.streams.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, stream)) = self.streams.remove(&id) {
                let _ = stream.close();
            }
        }
        tracing::debug!(session = %self.identity.log_name(), "Session expired");
    }

    fn session_id(&self) -> Option<SessionId> {
        Some(self.id.clone())
    }

    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    fn secret(&self) -> Option<Secret> {
        Some(self.secret.clone())
    }

    fn new_stream(&self) -> Result<Stream, SessionError> {
        if self.expired() {
            return Err(SessionError::NotFound);
        }
        let id = random_token(STREAM_ID_BYTES);
        let stream = Stream::new(id.clone(), &self.stream_options);
        self.streams.insert(id.clone(), stream.clone());
        // `expire` may have swept the map between the check and the insert.
        if self.expired.load(Ordering::SeqCst) {
            if let Some((_, stream)) = self.streams.remove(&id) {
                let _ = stream.close();
            }
            return Err(SessionError::NotFound);
        }
        Ok(stream)
    }

    fn get_stream(&self, signed_id: &[u8]) -> Result<Stream, SessionError> {
        let raw = self
            .secret
            .unwrap_authentication(&[STREAM_ID_PART, signed_id])
            .map_err(|_| SessionError::StreamNotFound)?;
        let id = String::from_utf8(raw).map_err(|_| SessionError::StreamNotFound)?;

        let stream = self
            .streams
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::StreamNotFound)?;
        if stream.is_closed() {
            self.streams.remove(&id);
            return Err(SessionError::StreamNotFound);
        }
        Ok(stream)
    }

    fn active_streams(&self) -> usize {
        self.streams.retain(|_, stream| !stream.is_closed());
        self.streams.len()
    }
}

/// Session server backed by a concurrent map.
pub struct RamSessionServer {
    sessions: DashMap<SessionId, Arc<RamSession>>,
    ids: SessionIdGenerator,
    secrets: Box<dyn SecretSource>,
    timeout: Duration,
    stream_options: StreamOptions,
}

impl RamSessionServer {
    pub fn new(ids: SessionIdGenerator, timeout: Duration, stream_options: StreamOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            ids,
            secrets: Box::new(OsSecrets),
            timeout,
            stream_options,
        }
    }

    /// Replace the per-session secret source.
    pub fn with_secrets(mut self, secrets: Box<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove and expire every session past its deadline. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut purged = 0;
        for id in stale {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.expire();
                purged += 1;
            }
        }
        if purged > 0 {
            metrics::set_sessions_active(self.sessions.len());
        }
        purged
    }

    /// Periodically purge expired sessions until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.sessions.len(), "Purged expired sessions");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl AuthenticationUnwrappers for RamSessionServer {
    fn authentication_unwrapper(&self, id: &str) -> Option<Arc<dyn AuthenticationUnwrapper>> {
        let session = self.get_session(&SessionId::new(id)).ok()?;
        let secret = session.secret()?;
        Some(Arc::new(secret))
    }
}

impl SessionServer for RamSessionServer {
    fn get_session(&self, id: &SessionId) -> Result<Arc<dyn Session>, SessionError> {
        if !self.ids.check(id) {
            return Err(SessionError::NotFound);
        }
        let session = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotFound)?;

        if session.expired() {
            self.sessions.remove(id);
            session.expire();
            metrics::set_sessions_active(self.sessions.len());
            return Err(SessionError::NotFound);
        }
        session.refresh();
        Ok(session)
    }

    fn new_session(&self, identity: Identity) -> Result<Arc<dyn Session>, SessionError> {
        let id = self
            .ids
            .generate()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let session = Arc::new(RamSession::new(
            id.clone(),
            identity,
            self.secrets.new_secret(),
            self.timeout,
            self.stream_options.clone(),
        ));
        self.sessions.insert(id, session.clone());
        metrics::set_sessions_active(self.sessions.len());
        tracing::debug!(user = %session.identity.log_name(), "Session created");
        Ok(session)
    }
}
