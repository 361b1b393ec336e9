//! Username/password authentication.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

use super::{AuthError, Authentication, NamedUser, Normalized};

/// Checks a username and password.
///
/// Both arrive NFKC-normalized.
pub trait PasswordAuthenticator: Send + Sync {
    fn authenticate(
        &self,
        username: &Normalized,
        password: &Normalized,
    ) -> Result<Arc<dyn Authentication>, AuthError>;
}

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct PasswordHashError(String);

/// Hash a password into an Argon2 PHC string with a random salt.
pub fn hash_password(password: &Normalized) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordHashError(e.to_string()))
}

/// A fixed table of users, for demos and tests.
///
/// Passwords are held as Argon2 PHC strings.
#[derive(Debug, Default, Clone)]
pub struct StaticPasswords {
    users: HashMap<Normalized, String>,
    locked: Vec<Normalized>,
}

impl StaticPasswords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str) -> Result<Self, PasswordHashError> {
        let hash = hash_password(&Normalized::new(password))?;
        self.users.insert(Normalized::new(username), hash);
        Ok(self)
    }

    pub fn lock(mut self, username: &str) -> Self {
        self.locked.push(Normalized::new(username));
        self
    }
}

impl PasswordAuthenticator for StaticPasswords {
    fn authenticate(
        &self,
        username: &Normalized,
        password: &Normalized,
    ) -> Result<Arc<dyn Authentication>, AuthError> {
        if username.is_empty() && password.is_empty() {
            return Err(AuthError::NoAuthGiven);
        }
        if self.locked.contains(username) {
            return Err(AuthError::LockedOut);
        }
        let Some(stored) = self.users.get(username) else {
            return Err(AuthError::WrongUserOrPassword);
        };
        let parsed = PasswordHash::new(stored)
            .map_err(|e| AuthError::AuthServiceDown(format!("unreadable password hash: {e}")))?;
        match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed) {
            Ok(()) => Ok(Arc::new(NamedUser::new(username.as_str(), "password"))),
            Err(_) => Err(AuthError::WrongUserOrPassword),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(pw: &StaticPasswords, user: &str, pass: &str) -> Result<Arc<dyn Authentication>, AuthError> {
        pw.authenticate(&Normalized::new(user), &Normalized::new(pass))
    }

    #[test]
    fn test_static_passwords() {
        let pw = StaticPasswords::new().with_user("alice", "hunter2").unwrap().lock("mallory");
        let auth = check(&pw, "alice", "hunter2").unwrap();
        assert_eq!(auth.log_name(), "alice");
        assert_eq!(check(&pw, "alice", "nope").unwrap_err(), AuthError::WrongUserOrPassword);
        assert_eq!(check(&pw, "bob", "hunter2").unwrap_err(), AuthError::WrongUserOrPassword);
        assert_eq!(check(&pw, "mallory", "x").unwrap_err(), AuthError::LockedOut);
        assert_eq!(check(&pw, "", "").unwrap_err(), AuthError::NoAuthGiven);
    }

    #[test]
    fn test_look_alike_username_normalized() {
        let pw = StaticPasswords::new().with_user("alice", "secret").unwrap();
        let auth = check(&pw, "ａｌｉｃｅ", "secret").unwrap();
        assert_eq!(auth.log_name(), "alice");

        let locked = StaticPasswords::new().lock("ｍａｌｌｏｒｙ");
        assert_eq!(check(&locked, "mallory", "x").unwrap_err(), AuthError::LockedOut);
    }

    #[test]
    fn test_stored_as_salted_argon2() {
        let a = hash_password(&Normalized::new("same")).unwrap();
        let b = hash_password(&Normalized::new("same")).unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(!a.contains("same"));
    }
}
