//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! routing table (clauses call add_security_hole)
//!     → RouteResult.holes
//!     → headers.rs (apply_security_headers, after the handler has written)
//!     → response headers
//! ```
//!
//! # Design Decisions
//! - Default deny: every protective header is on unless a hole is opened
//! - Holes are declared in the routing table, so reading the table shows
//!   the real security posture
//! - Applied last, overriding anything handler code set

pub mod headers;

pub use headers::{apply_security_headers, SecurityHole};
