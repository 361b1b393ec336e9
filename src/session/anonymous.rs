//! The session used when nobody is logged in.

use crate::identity::Identity;
use crate::secret::Secret;
use crate::stream::Stream;

use super::{Session, SessionError, SessionId};

/// Always expired, has no ID and cannot own streams.
#[derive(Debug, Clone)]
pub struct AnonymousSession {
    identity: Identity,
}

impl AnonymousSession {
    pub fn new() -> Self {
        Self {
            identity: Identity::anonymous(),
        }
    }
}

impl Default for AnonymousSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for AnonymousSession {
    fn expired(&self) -> bool {
        true
    }

    fn expire(&self) {}

    fn session_id(&self) -> Option<SessionId> {
        None
    }

    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    fn secret(&self) -> Option<Secret> {
        None
    }

    fn new_stream(&self) -> Result<Stream, SessionError> {
        Err(SessionError::StreamsUnsupported)
    }

    fn get_stream(&self, _signed_id: &[u8]) -> Result<Stream, SessionError> {
        Err(SessionError::StreamsUnsupported)
    }

    fn active_streams(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_session() {
        let s = AnonymousSession::new();
        assert!(s.expired());
        s.expire();
        assert!(s.expired());
        assert!(s.session_id().is_none());
        assert!(s.secret().is_none());
        assert!(!s.identity().is_authenticated());
        assert_eq!(s.new_stream().unwrap_err(), SessionError::StreamsUnsupported);
        assert_eq!(s.get_stream(b"x").unwrap_err(), SessionError::StreamsUnsupported);
    }
}
