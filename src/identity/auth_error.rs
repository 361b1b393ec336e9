//! Structured authentication failures.

use thiserror::Error;

/// Why an authentication attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("wrong username or password")]
    WrongUserOrPassword,

    #[error("authentication service unavailable: {0}")]
    AuthServiceDown(String),

    #[error("account locked out")]
    LockedOut,

    #[error("no credentials given")]
    NoAuthGiven,
}

impl AuthError {
    pub fn is_wrong_user_or_password(&self) -> bool {
        matches!(self, AuthError::WrongUserOrPassword)
    }

    pub fn is_auth_service_down(&self) -> bool {
        matches!(self, AuthError::AuthServiceDown(_))
    }

    pub fn is_no_auth_given(&self) -> bool {
        matches!(self, AuthError::NoAuthGiven)
    }

    /// Whether presenting the login form again makes sense.
    pub fn may_try_again(&self) -> bool {
        !matches!(self, AuthError::LockedOut)
    }
}
