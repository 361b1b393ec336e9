//! Authentication results and the identity a session carries.

use std::fmt;
use std::sync::Arc;

use super::Normalized;

/// The result of an authentication.
pub trait Authentication: Send + Sync + fmt::Debug {
    /// Name suitable for log lines.
    fn log_name(&self) -> String;

    fn is_authenticated(&self) -> bool;

    /// How the user authenticated ("password", "unauthenticated", ...).
    fn authentication_name(&self) -> &str;
}

/// The anonymous user.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unauthenticated;

impl Authentication for Unauthenticated {
    fn log_name(&self) -> String {
        "anonymous".to_string()
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    fn authentication_name(&self) -> &str {
        "unauthenticated"
    }
}

/// A user known by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedUser {
    name: String,
    method: &'static str,
}

impl NamedUser {
    /// The name is NFKC-normalized.
    pub fn new(name: &str, method: &'static str) -> Self {
        Self {
            name: Normalized::new(name).into_string(),
            method,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Authentication for NamedUser {
    fn log_name(&self) -> String {
        self.name.clone()
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn authentication_name(&self) -> &str {
        self.method
    }
}

/// Who a session belongs to.
#[derive(Clone, Debug)]
pub struct Identity {
    authentication: Arc<dyn Authentication>,
}

impl Identity {
    pub fn new(authentication: Arc<dyn Authentication>) -> Self {
        Self { authentication }
    }

    pub fn anonymous() -> Self {
        Self::new(Arc::new(Unauthenticated))
    }

    pub fn authentication(&self) -> &dyn Authentication {
        self.authentication.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication.is_authenticated()
    }

    pub fn log_name(&self) -> String {
        self.authentication.log_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let id = Identity::anonymous();
        assert!(!id.is_authenticated());
        assert_eq!(id.log_name(), "anonymous");
        assert_eq!(id.authentication().authentication_name(), "unauthenticated");
    }

    #[test]
    fn test_named_user_name_normalized() {
        assert_eq!(NamedUser::new("ａｌｉｃｅ", "password").name(), "alice");
    }

    #[test]
    fn test_named_user_identity() {
        let id = Identity::new(Arc::new(NamedUser::new("alice", "password")));
        assert!(id.is_authenticated());
        assert_eq!(id.log_name(), "alice");
        assert_eq!(id.authentication().authentication_name(), "password");
    }
}
