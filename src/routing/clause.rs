//! The clause extension point.

use std::fmt;
use std::sync::Arc;

use super::block::RouteBlock;
use super::handler::{Handler, StreamHandler};
use super::request::RouteRequest;
use super::RouteError;

/// What a clause decided about the request.
pub enum ClauseOutcome<'b> {
    /// Did not apply. Anything the clause recorded is discarded.
    NoMatch,
    /// Applied without deciding. Recorded effects are kept and the next
    /// clause in the block is tried.
    Pass,
    Handler(Arc<dyn Handler>),
    Stream(Arc<dyn StreamHandler>),
    /// Continue routing into this block.
    Descend(&'b RouteBlock),
    /// Continue routing into this block; if nothing matches there, the
    /// enclosing block gives up instead of trying later clauses.
    Gate(&'b RouteBlock),
}

impl fmt::Debug for ClauseOutcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => f.write_str("NoMatch"),
            Self::Pass => f.write_str("Pass"),
            Self::Handler(h) => write!(f, "Handler({})", h.name()),
            Self::Stream(h) => write!(f, "Stream({})", h.name()),
            Self::Descend(b) => write!(f, "Descend({} clauses)", b.len()),
            Self::Gate(b) => write!(f, "Gate({} clauses)", b.len()),
        }
    }
}

/// One decision unit in the routing tree.
///
/// Implement this to add custom routing logic. A clause only returns
/// `Err` for a genuine internal failure, never for "did not match".
/// The block returned by [`RouterClause::route_block`] must be the one
/// the clause descends into, and must not change once serving starts.
pub trait RouterClause: Send + Sync {
    fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError>;

    /// Stable identifier of the clause kind.
    fn name(&self) -> &'static str;

    /// The argument that, with [`RouterClause::name`], recreates this clause.
    fn argument(&self) -> String;

    /// `None` means the clause never takes a block, which is distinct from
    /// an empty block.
    fn route_block(&self) -> Option<&RouteBlock>;

    /// An empty clause of the same kind.
    fn prototype(&self) -> Box<dyn RouterClause>;
}
