//! Identity and authentication.
//!
//! # Data Flow
//! ```text
//! login form (username, password)
//!     → normalize.rs (NFKC)
//!     → password.rs (PasswordAuthenticator)
//!     → Arc<dyn Authentication> or AuthError
//!     → Identity (constant for the session's lifetime)
//!
//! routing
//!     → cookie_auth.rs (CookieAuth clause)
//!     → valid session cookie: bind session, pass through
//!     → otherwise: login attempt, or descend into the auth block
//! ```

pub mod auth_error;
pub mod authentication;
pub mod cookie_auth;
pub mod normalize;
pub mod password;

pub use auth_error::AuthError;
pub use authentication::{Authentication, Identity, NamedUser, Unauthenticated};
pub use cookie_auth::CookieAuth;
pub use normalize::Normalized;
pub use password::{hash_password, PasswordAuthenticator, PasswordHashError, StaticPasswords};
