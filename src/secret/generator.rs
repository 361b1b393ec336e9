//! Random key and token generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use super::Secret;

/// Fill `len` bytes from the operating system CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// `len` random bytes as URL-safe base64 without padding.
pub fn random_token(len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(len))
}

/// Source of per-session secrets.
pub trait SecretSource: Send + Sync {
    fn new_secret(&self) -> Secret;
}

/// Generates every secret directly from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecrets;

impl SecretSource for OsSecrets {
    fn new_secret(&self) -> Secret {
        Secret::generate()
    }
}
