//! Session ID minting and checking.
//!
//! An ID is `base64(random || HMAC(key, random))`. Only IDs minted under
//! the server's key pass [`SessionIdGenerator::check`], so a client cannot
//! pick its own session ID.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::SessionId;
use crate::secret::{random_bytes, Secret, SecretError};

const RANDOM_LEN: usize = 32;
const TAG_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionIdGenerator {
    key: Secret,
}

impl SessionIdGenerator {
    pub fn new(key: Secret) -> Self {
        Self { key }
    }

    /// Generator with a random key; IDs do not survive a restart.
    pub fn ephemeral() -> Self {
        Self::new(Secret::generate())
    }

    pub fn generate(&self) -> Result<SessionId, SecretError> {
        let mut raw = random_bytes(RANDOM_LEN);
        let tag = self.key.sign_raw(&raw)?;
        raw.extend_from_slice(&tag);
        Ok(SessionId::new(STANDARD.encode(raw)))
    }

    pub fn check(&self, id: &SessionId) -> bool {
        let Ok(raw) = STANDARD.decode(id.as_str()) else {
            return false;
        };
        if raw.len() != RANDOM_LEN + TAG_LEN {
            return false;
        }
        let (random, tag) = raw.split_at(RANDOM_LEN);
        self.key.verify_raw(random, tag).is_ok()
    }
}
