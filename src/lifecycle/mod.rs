//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     validated AppConfig → session server → routing table → dispatcher
//!
//! Shutdown (shutdown.rs):
//!     SIGINT/SIGTERM → trigger → listener stops accepting
//!                              → session sweeper exits
//!                              → in-flight requests drain
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners

pub mod shutdown;
pub mod startup;

pub use shutdown::{wait_for_signal, Shutdown};
pub use startup::StartupError;
