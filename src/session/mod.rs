//! Sessions and session servers.
//!
//! # Data Flow
//! ```text
//! "session" cookie value
//!     → ids.rs (SessionIdGenerator::check, rejects ids not minted here)
//!     → SessionServer::get_session
//!     → Arc<dyn Session> (never expired) or NotFound
//!
//! successful login
//!     → SessionServer::new_session(identity)
//!     → fresh id + fresh secret + empty stream registry
//! ```
//!
//! # Design Decisions
//! - "Not found" is a distinct error from storage failure so that clauses
//!   can treat it as a normal re-authentication path
//! - A stream ID handed to the client is signed with the session secret;
//!   a bad signature is reported exactly like an unknown ID
//! - Expiring a session closes every stream it owns

pub mod anonymous;
pub mod ids;
pub mod ram;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::identity::Identity;
use crate::secret::{AuthenticationUnwrappers, Authenticator, Secret};
use crate::stream::Stream;

pub use anonymous::AnonymousSession;
pub use ids::SessionIdGenerator;
pub use ram::RamSessionServer;

/// Name of the cookie carrying the session ID.
pub const SESSION_COOKIE: &str = "session";

/// Leading part bound into signed stream IDs.
pub(crate) const STREAM_ID_PART: &[u8] = b"stream";

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from sessions and session servers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("stream not found")]
    StreamNotFound,

    #[error("session does not support streams")]
    StreamsUnsupported,

    #[error("session storage failure: {0}")]
    Storage(String),
}

/// A user's session.
pub trait Session: Send + Sync {
    fn expired(&self) -> bool;

    /// Invalidate the session and close its streams. Idempotent.
    fn expire(&self);

    /// None for sessions that have no persistent identity.
    fn session_id(&self) -> Option<SessionId>;

    fn identity(&self) -> Identity;

    /// Signing key for this session's cookies and stream IDs.
    fn secret(&self) -> Option<Secret>;

    fn new_stream(&self) -> Result<Stream, SessionError>;

    /// Look up a stream by the signed ID previously handed to the client.
    fn get_stream(&self, signed_id: &[u8]) -> Result<Stream, SessionError>;

    fn active_streams(&self) -> usize;
}

/// Produces and retrieves sessions.
///
/// The [`AuthenticationUnwrappers`] lookup resolves a session ID to that
/// session's secret.
pub trait SessionServer: AuthenticationUnwrappers + Send + Sync {
    /// Never returns an expired session.
    fn get_session(&self, id: &SessionId) -> Result<Arc<dyn Session>, SessionError>;

    fn new_session(&self, identity: Identity) -> Result<Arc<dyn Session>, SessionError>;
}

/// Sign a stream ID with the session's secret for handing to the client.
pub fn sign_stream_id(session: &dyn Session, stream_id: &str) -> Result<String, SessionError> {
    let secret = session.secret().ok_or(SessionError::StreamsUnsupported)?;
    let signed = secret
        .authenticate(&[STREAM_ID_PART, stream_id.as_bytes()])
        .map_err(|_| SessionError::StreamsUnsupported)?;
    String::from_utf8(signed).map_err(|_| SessionError::StreamNotFound)
}
