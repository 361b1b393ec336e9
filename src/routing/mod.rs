//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (path, cookies, session)
//!     → request.rs (RouteRequest: stack of frames over the path)
//!     → block.rs (RouteBlock::route, clauses in declaration order)
//!     → clauses.rs (location / exact / return / forward / stream)
//!         → consume path, record side effects in the current frame
//!         → yield a handler, descend into a sub-block, pass, or no match
//!     → result.rs (RouteResult: flatten frames on the winning path)
//!     → Terminal handler + RouteResult, no match, or RouteError
//! ```
//!
//! # Design Decisions
//! - Route tree is built at startup and immutable at runtime
//! - First match wins; declaration order is the only tie-break, so the
//!   table reads top to bottom
//! - Side effects live in per-level frames; a failed branch's frame is
//!   reset, so nothing it recorded reaches the response
//! - A block never hands a sub-block to its caller: `RouteBlock::route`
//!   returns `Terminal`, which has no block variant

pub mod block;
pub mod clause;
pub mod clauses;
pub mod handler;
pub mod request;
pub mod result;

use thiserror::Error;

use crate::cookie::CookieError;
use crate::session::SessionError;

pub use block::{ClauseDescription, RouteBlock, Terminal};
pub use clause::{ClauseOutcome, RouterClause};
pub use clauses::{ExactLocation, ForwardClause, ReturnClause, StaticLocation, StreamClause};
pub use handler::{handler_fn, FnHandler, Handler, NotFound, StaticResponse, StreamHandler};
pub use request::{HeaderOp, RouteRequest};
pub use result::RouteResult;

/// Maximum nesting of route blocks for one request.
pub const MAX_DEPTH: usize = 64;

/// A genuine failure while routing. Not matching is not an error.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("session store failure: {0}")]
    Session(#[from] SessionError),

    #[error("cookie error: {0}")]
    Cookie(#[from] CookieError),

    #[error("route blocks nested deeper than {0}")]
    TooDeep(usize),

    #[error("clause {clause} failed: {reason}")]
    Clause { clause: &'static str, reason: String },
}
