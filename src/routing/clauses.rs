//! Built-in clauses.

use std::sync::Arc;

use super::block::RouteBlock;
use super::clause::{ClauseOutcome, RouterClause};
use super::handler::{Handler, NotFound, StreamHandler};
use super::request::RouteRequest;
use super::RouteError;

/// Matches a literal prefix of the remaining path, consumes it, and
/// descends.
///
/// `/a` matches `/a_different` at this level. Put a [`ReturnClause`] in
/// the block to require the path to end there.
pub struct StaticLocation {
    location: String,
    block: RouteBlock,
}

impl StaticLocation {
    pub fn new(location: impl Into<String>, block: RouteBlock) -> Self {
        Self {
            location: location.into(),
            block,
        }
    }
}

impl RouterClause for StaticLocation {
    fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        if !rr.remaining_path().as_bytes().starts_with(self.location.as_bytes()) {
            return Ok(ClauseOutcome::NoMatch);
        }
        rr.consume_path(self.location.len());
        Ok(ClauseOutcome::Descend(&self.block))
    }

    fn name(&self) -> &'static str {
        "location"
    }

    fn argument(&self) -> String {
        self.location.clone()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        Some(&self.block)
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(StaticLocation::new("", RouteBlock::new()))
    }
}

/// Matches only when the remaining path is exactly the literal.
pub struct ExactLocation {
    location: String,
    block: RouteBlock,
}

impl ExactLocation {
    pub fn new(location: impl Into<String>, block: RouteBlock) -> Self {
        Self {
            location: location.into(),
            block,
        }
    }
}

impl RouterClause for ExactLocation {
    fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        if rr.remaining_path() != self.location {
            return Ok(ClauseOutcome::NoMatch);
        }
        rr.consume_entire_path();
        Ok(ClauseOutcome::Descend(&self.block))
    }

    fn name(&self) -> &'static str {
        "exact"
    }

    fn argument(&self) -> String {
        self.location.clone()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        Some(&self.block)
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(ExactLocation::new("", RouteBlock::new()))
    }
}

/// Yields its handler only once the whole path is consumed.
pub struct ReturnClause {
    handler: Arc<dyn Handler>,
}

impl ReturnClause {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }
}

impl RouterClause for ReturnClause {
    fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        if rr.is_complete() {
            Ok(ClauseOutcome::Handler(self.handler.clone()))
        } else {
            Ok(ClauseOutcome::NoMatch)
        }
    }

    fn name(&self) -> &'static str {
        "return"
    }

    fn argument(&self) -> String {
        self.handler.name().to_string()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        None
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(ReturnClause::new(Arc::new(NotFound)))
    }
}

/// Yields its handler regardless of the remaining path, which the handler
/// reads from the route result.
pub struct ForwardClause {
    handler: Arc<dyn Handler>,
}

impl ForwardClause {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }
}

impl RouterClause for ForwardClause {
    fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        Ok(ClauseOutcome::Handler(self.handler.clone()))
    }

    fn name(&self) -> &'static str {
        "forward"
    }

    fn argument(&self) -> String {
        self.handler.name().to_string()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        None
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(ForwardClause::new(Arc::new(NotFound)))
    }
}

/// Forward semantics for stream requests.
pub struct StreamClause {
    handler: Arc<dyn StreamHandler>,
}

impl StreamClause {
    pub fn new(handler: Arc<dyn StreamHandler>) -> Self {
        Self { handler }
    }
}

impl RouterClause for StreamClause {
    fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        Ok(ClauseOutcome::Stream(self.handler.clone()))
    }

    fn name(&self) -> &'static str {
        "stream"
    }

    fn argument(&self) -> String {
        self.handler.name().to_string()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        None
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(StreamClause::new(Arc::new(NotFound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::test_context;
    use crate::routing::{handler_fn, Terminal};

    fn named(name: &'static str) -> Arc<dyn Handler> {
        handler_fn(name, |_, _| {})
    }

    fn resolve(block: &RouteBlock, path: &str) -> Option<String> {
        let mut ctx = test_context(path);
        let mut rr = RouteRequest::new(&mut ctx, false);
        block
            .route(&mut rr)
            .unwrap()
            .map(|t| t.name().to_string())
    }

    #[test]
    fn test_location_requires_prefix_bytes() {
        let mut root = RouteBlock::new();
        root.add_location_return("/home/product/firmware", named("firmware"));

        assert_eq!(resolve(&root, "/home/product/firmware").as_deref(), Some("firmware"));
        assert_eq!(resolve(&root, "/home/product/firmwares"), None);
        assert_eq!(resolve(&root, "/home/product/firm"), None);
    }

    #[test]
    fn test_exact_location() {
        let mut root = RouteBlock::new();
        root.add_exact_return("/", named("index"));
        root.add_location_forward("/", named("catchall"));

        assert_eq!(resolve(&root, "/").as_deref(), Some("index"));
        assert_eq!(resolve(&root, "/other").as_deref(), Some("catchall"));
    }

    #[test]
    fn test_forward_ignores_remaining_path() {
        let mut root = RouteBlock::new();
        root.add_location_forward("/", named("fwd"));

        assert_eq!(resolve(&root, "/anything/goes").as_deref(), Some("fwd"));
        assert_eq!(resolve(&root, "/").as_deref(), Some("fwd"));
    }

    #[test]
    fn test_forward_remaining_path_in_result() {
        let mut root = RouteBlock::new();
        root.add_location_forward("/files", named("files"));

        let mut ctx = test_context("/files/a/b.txt");
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert!(root.route(&mut rr).unwrap().is_some());
        let result = rr.route_result();
        assert_eq!(result.preceding_path, "/files");
        assert_eq!(result.remaining_path, "/a/b.txt");
    }

    #[test]
    fn test_stream_clause_yields_stream_handler() {
        let mut root = RouteBlock::new();
        root.add_stream_forward("/live", Arc::new(NotFound));

        let mut ctx = test_context("/live/counter");
        let mut rr = RouteRequest::new(&mut ctx, false);
        let terminal = root.route(&mut rr).unwrap();
        assert!(matches!(terminal, Some(Terminal::Stream(_))));
    }

    #[test]
    fn test_audit_lists_tree() {
        let mut root = RouteBlock::new();
        root.location("/a", |a| {
            a.add_location_return("/b", named("ab"));
        });
        root.add_location_forward("/", named("fwd"));

        let audit = root.audit();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].name, "location");
        assert_eq!(audit[0].argument, "/a");
        let inner = audit[0].block.as_ref().unwrap();
        assert_eq!(inner[0].argument, "/b");
        assert_eq!(inner[0].block.as_ref().unwrap()[0].name, "return");
        assert_eq!(inner[0].block.as_ref().unwrap()[0].argument, "ab");

        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json[1]["block"][0]["name"], "forward");
    }

    #[test]
    fn test_prototypes_are_empty() {
        let clause = StaticLocation::new("/x", RouteBlock::new());
        let proto = clause.prototype();
        assert_eq!(proto.name(), "location");
        assert_eq!(proto.argument(), "");
        assert!(ReturnClause::new(named("h")).prototype().route_block().is_none());
    }
}
