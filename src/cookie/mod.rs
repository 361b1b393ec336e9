//! Cookie rendering and parsing.
//!
//! # Data Flow
//! ```text
//! Outgoing:
//!     OutCookie::new(name, value, authenticator)
//!     → builder options (duration, path, client_can_read, ...)
//!     → render(): name=value__!sauthed!_<sig>; Path=/; HttpOnly; Secure; SameSite=Strict
//!
//! Incoming:
//!     Cookie header lines
//!     → incoming.rs (loose parse)
//!     → "session" verified against the session it names
//!     → other signed cookies verified against that same session
//!     → InCookies + names of cookies that failed (to be deleted)
//! ```
//!
//! # Design Decisions
//! - The most restrictive cookie is the default; each relaxation is an
//!   explicit builder call
//! - Invalid names, values, paths or domains are rejected, never repaired
//! - No cookie encryption: secrets belong in the session, not the client

pub mod incoming;
pub mod outgoing;

use thiserror::Error;

use crate::secret::SecretError;

pub use incoming::{parse_cookies, InCookie, InCookies};
pub use outgoing::{OutCookie, SameSite};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CookieError {
    #[error("can't create cookie '{name}' because {reason}")]
    Invalid { name: String, reason: &'static str },

    #[error("can't sign cookie: {0}")]
    Sign(#[from] SecretError),
}

/// RFC 6265 token characters allowed in a cookie name.
pub(crate) fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Strict RFC 6265 cookie-octet.
pub(crate) fn is_strict_value_byte(b: u8) -> bool {
    (0x20..0x80).contains(&b) && !matches!(b, b' ' | b'"' | b',' | b';' | b'\\')
}

/// What browsers actually accept: also allows space and comma.
pub(crate) fn is_loose_value_byte(b: u8) -> bool {
    (0x20..0x80).contains(&b) && !matches!(b, b'"' | b';' | b'\\')
}
