//! HMAC signing and verification.

use std::fmt;
use std::sync::Arc;

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Marker separating an authenticated value from its signature.
pub const SIGN_SUFFIX: &str = "__!sauthed!_";

/// Length of an HMAC-SHA256 tag in the cookie-safe alphabet.
const SIGNATURE_LEN: usize = 43;

/// Key length used by [`Secret::generate`].
pub const KEY_LEN: usize = 32;

const SIGNATURE_ALPHABET: Alphabet =
    match Alphabet::new("0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$%") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("signature alphabet must be 64 unique printable bytes"),
    };

/// Cookie-safe base64: no `=`, `+` or `/`.
const SIGNATURE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &SIGNATURE_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

/// Errors from signing or verifying.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecretError {
    #[error("value is not authenticated")]
    NotAuthenticated,

    #[error("no secret key available")]
    NoSecretKey,
}

/// Produces signed byte sequences.
///
/// The returned value is the last part followed by [`SIGN_SUFFIX`] and the
/// signature; the earlier parts are bound into the signature but not
/// repeated in the output.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, parts: &[&[u8]]) -> Result<Vec<u8>, SecretError>;
}

/// Verifies a signed byte sequence and strips the signature.
///
/// The last part is the signed value; earlier parts must be exactly the
/// parts given to [`Authenticator::authenticate`].
pub trait AuthenticationUnwrapper: Send + Sync {
    fn unwrap_authentication(&self, parts: &[&[u8]]) -> Result<Vec<u8>, SecretError>;
}

/// Looks up an unwrapper by an opaque identifier (a session ID).
pub trait AuthenticationUnwrappers: Send + Sync {
    fn authentication_unwrapper(&self, id: &str) -> Option<Arc<dyn AuthenticationUnwrapper>>;
}

/// An HMAC key.
#[derive(Clone)]
pub struct Secret {
    key: Arc<[u8]>,
}

impl Secret {
    /// Wrap existing key material.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key: Vec<u8> = key.into();
        Self { key: key.into() }
    }

    /// Generate a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        Self::new(super::generator::random_bytes(KEY_LEN))
    }

    /// True when there is no key material; such a secret refuses to sign.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Raw HMAC over `data`, with no part framing.
    pub fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut mac = self.keyed()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time check of a tag produced by [`Secret::sign_raw`].
    pub fn verify_raw(&self, data: &[u8], tag: &[u8]) -> Result<(), SecretError> {
        let mut mac = self.keyed()?;
        mac.update(data);
        mac.verify_slice(tag).map_err(|_| SecretError::NotAuthenticated)
    }

    fn keyed(&self) -> Result<HmacSha256, SecretError> {
        if self.key.is_empty() {
            return Err(SecretError::NoSecretKey);
        }
        HmacSha256::new_from_slice(&self.key).map_err(|_| SecretError::NoSecretKey)
    }

    fn mac_parts(&self, parts: &[&[u8]]) -> Result<HmacSha256, SecretError> {
        let mut mac = self.keyed()?;
        for part in parts {
            write_escaped(&mut mac, part);
            mac.update(&[0x00, 0x01]);
        }
        Ok(mac)
    }
}

/// Feed `part` into the MAC with every zero byte doubled.
fn write_escaped(mac: &mut HmacSha256, part: &[u8]) {
    let mut start = 0;
    for (i, byte) in part.iter().enumerate() {
        if *byte == 0 {
            mac.update(&part[start..=i]);
            mac.update(&[0x00]);
            start = i + 1;
        }
    }
    mac.update(&part[start..]);
}

impl Authenticator for Secret {
    fn authenticate(&self, parts: &[&[u8]]) -> Result<Vec<u8>, SecretError> {
        let mac = self.mac_parts(parts)?;
        let signature = SIGNATURE_ENGINE.encode(mac.finalize().into_bytes());
        let value = parts.last().copied().unwrap_or_default();

        let mut out = Vec::with_capacity(value.len() + SIGN_SUFFIX.len() + signature.len());
        out.extend_from_slice(value);
        out.extend_from_slice(SIGN_SUFFIX.as_bytes());
        out.extend_from_slice(signature.as_bytes());
        Ok(out)
    }
}

impl AuthenticationUnwrapper for Secret {
    fn unwrap_authentication(&self, parts: &[&[u8]]) -> Result<Vec<u8>, SecretError> {
        if self.key.is_empty() {
            return Err(SecretError::NoSecretKey);
        }
        let (signed, leading) = parts.split_last().ok_or(SecretError::NotAuthenticated)?;

        let trailer = SIGN_SUFFIX.len() + SIGNATURE_LEN;
        if signed.len() < trailer {
            return Err(SecretError::NotAuthenticated);
        }
        let (value, rest) = signed.split_at(signed.len() - trailer);
        let (suffix, signature) = rest.split_at(SIGN_SUFFIX.len());
        if suffix != SIGN_SUFFIX.as_bytes() {
            return Err(SecretError::NotAuthenticated);
        }
        let tag = SIGNATURE_ENGINE
            .decode(signature)
            .map_err(|_| SecretError::NotAuthenticated)?;

        let mut all: Vec<&[u8]> = leading.to_vec();
        all.push(value);
        let mac = self.mac_parts(&all)?;
        mac.verify_slice(&tag)
            .map_err(|_| SecretError::NotAuthenticated)?;

        Ok(value.to_vec())
    }
}

/// Cheap shape check: does `value` end in a suffix and a plausible signature?
pub fn looks_signed(value: &[u8]) -> bool {
    let trailer = SIGN_SUFFIX.len() + SIGNATURE_LEN;
    if value.len() < trailer {
        return false;
    }
    let (suffix, signature) = value[value.len() - trailer..].split_at(SIGN_SUFFIX.len());
    suffix == SIGN_SUFFIX.as_bytes()
        && signature
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'$' || *b == b'%')
}

/// Length added to a value by signing.
pub const SIGNED_TRAILER_LEN: usize = SIGN_SUFFIX.len() + SIGNATURE_LEN;

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = Sha256::digest(&self.key);
        f.debug_struct("Secret")
            .field("fingerprint", &hex::encode(&digest[..4]))
            .finish()
    }
}
