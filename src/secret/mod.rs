//! Secrets and HMAC authentication of byte sequences.
//!
//! # Data Flow
//! ```text
//! parts [name, value]
//!     → authenticator.rs (HMAC-SHA256 over escaped, delimited parts)
//!     → value || "__!sauthed!_" || base64(sig)
//!
//! signed value + leading parts
//!     → authenticator.rs (split suffix, recompute, constant-time compare)
//!     → original value or NotAuthenticated
//! ```
//!
//! # Design Decisions
//! - Every part is bound into the MAC, not only the value, so a signature
//!   minted for one cookie name cannot be replayed under another
//! - Zero bytes inside a part are doubled and each part ends with `0x00 0x01`,
//!   so part boundaries cannot be shifted without changing the MAC
//! - Key material never appears in `Debug` output

pub mod authenticator;
pub mod generator;

pub use authenticator::{
    looks_signed, AuthenticationUnwrapper, AuthenticationUnwrappers, Authenticator, Secret,
    KEY_LEN, SecretError, SIGNED_TRAILER_LEN, SIGN_SUFFIX,
};
pub use generator::{random_bytes, random_token, OsSecrets, SecretSource};
