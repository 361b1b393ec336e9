//! NFKC-normalized credentials.
//!
//! Compatibility characters that render alike (fullwidth letters,
//! ligatures, superscripts) fold to one form before any comparison, so a
//! look-alike name cannot pass for a different account.

use std::fmt;

use unicode_normalization::UnicodeNormalization;

/// A string that has been through NFKC normalization.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Normalized(String);

impl Normalized {
    pub fn new(s: &str) -> Self {
        Self(s.nfkc().collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Normalized {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Credentials end up here; keep passwords out of debug logs.
impl fmt::Debug for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Normalized").field(&"..").finish()
    }
}
