//! Route blocks: ordered clause lists, and the matching algorithm.

use std::sync::Arc;

use serde::Serialize;

use super::clause::{ClauseOutcome, RouterClause};
use super::clauses::{ExactLocation, ForwardClause, ReturnClause, StaticLocation, StreamClause};
use super::handler::{Handler, StreamHandler};
use super::request::RouteRequest;
use super::RouteError;

/// What a block resolves to. There is deliberately no block variant.
#[derive(Clone)]
pub enum Terminal {
    Handler(Arc<dyn Handler>),
    Stream(Arc<dyn StreamHandler>),
}

impl Terminal {
    pub fn name(&self) -> &str {
        match self {
            Self::Handler(h) => h.name(),
            Self::Stream(h) => h.name(),
        }
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(h) => write!(f, "Terminal::Handler({})", h.name()),
            Self::Stream(h) => write!(f, "Terminal::Stream({})", h.name()),
        }
    }
}

/// One node of a routing table audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClauseDescription {
    pub name: &'static str,
    pub argument: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<ClauseDescription>>,
}

/// An ordered list of clauses.
#[derive(Default)]
pub struct RouteBlock {
    clauses: Vec<Box<dyn RouterClause>>,
}

impl RouteBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Try each clause in declaration order; the first terminal wins.
    ///
    /// An error from any clause, at any depth, ends routing for the whole
    /// request.
    pub fn route(&self, rr: &mut RouteRequest<'_>) -> Result<Option<Terminal>, RouteError> {
        rr.advance()?;
        let mut checkpoint = rr.checkpoint();

        for clause in &self.clauses {
            let outcome = clause.route(rr)?;
            if rr.trace_enabled() {
                tracing::debug!(
                    depth = rr.depth(),
                    clause = clause.name(),
                    argument = %clause.argument(),
                    outcome = ?outcome,
                    remaining = rr.remaining_path(),
                    "Clause evaluated"
                );
            }

            match outcome {
                ClauseOutcome::Handler(handler) => return Ok(Some(Terminal::Handler(handler))),
                ClauseOutcome::Stream(handler) => return Ok(Some(Terminal::Stream(handler))),
                ClauseOutcome::Pass => {
                    checkpoint = rr.checkpoint();
                    continue;
                }
                ClauseOutcome::NoMatch => {}
                ClauseOutcome::Descend(block) => {
                    if let Some(terminal) = block.route(rr)? {
                        return Ok(Some(terminal));
                    }
                }
                ClauseOutcome::Gate(block) => {
                    if let Some(terminal) = block.route(rr)? {
                        return Ok(Some(terminal));
                    }
                    rr.restore(&checkpoint);
                    break;
                }
            }

            rr.restore(&checkpoint);
        }

        rr.retreat();
        Ok(None)
    }

    /// Append clauses.
    pub fn add(&mut self, clause: impl RouterClause + 'static) -> &mut Self {
        self.clauses.push(Box::new(clause));
        self
    }

    /// Route paths starting with `path` into `block`.
    pub fn add_location(&mut self, path: impl Into<String>, block: RouteBlock) -> &mut Self {
        self.add(StaticLocation::new(path, block))
    }

    /// Add a location whose block is filled in by `build`.
    pub fn location(
        &mut self,
        path: impl Into<String>,
        build: impl FnOnce(&mut RouteBlock),
    ) -> &mut Self {
        let mut block = RouteBlock::new();
        build(&mut block);
        self.add_location(path, block)
    }

    /// Serve `handler` at exactly `path`.
    pub fn add_location_return(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        self.add_location(path, RouteBlock::direct_return(handler))
    }

    /// Serve `handler` for `path` and everything below it.
    pub fn add_location_forward(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        let mut block = RouteBlock::new();
        block.add(ForwardClause::new(handler));
        self.add_location(path, block)
    }

    /// Serve stream requests for `path` and everything below it.
    pub fn add_stream_forward(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn StreamHandler>,
    ) -> &mut Self {
        let mut block = RouteBlock::new();
        block.add(StreamClause::new(handler));
        self.add_location(path, block)
    }

    /// Serve `handler` when the remaining path is exactly `path`.
    pub fn add_exact_return(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        self.add(ExactLocation::new(path, RouteBlock::direct_return(handler)))
    }

    /// A block holding only a return clause.
    pub fn direct_return(handler: Arc<dyn Handler>) -> Self {
        let mut block = RouteBlock::new();
        block.add(ReturnClause::new(handler));
        block
    }

    /// Describe the whole table, in matching order.
    pub fn audit(&self) -> Vec<ClauseDescription> {
        self.clauses
            .iter()
            .map(|clause| ClauseDescription {
                name: clause.name(),
                argument: clause.argument(),
                block: clause.route_block().map(RouteBlock::audit),
            })
            .collect()
    }
}

impl RouterClause for RouteBlock {
    fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        Ok(ClauseOutcome::Descend(self))
    }

    fn name(&self) -> &'static str {
        "block"
    }

    fn argument(&self) -> String {
        String::new()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        Some(self)
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(RouteBlock::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::OutCookie;
    use crate::http::request::test_context;
    use crate::routing::handler_fn;
    use axum::http::{HeaderName, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn named(name: &'static str) -> Arc<dyn Handler> {
        handler_fn(name, |_, _| {})
    }

    /// Records effects, then declines.
    struct LeaveTraces;

    impl RouterClause for LeaveTraces {
        fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
            rr.set_header(HeaderName::from_static("x-leak"), HeaderValue::from_static("1"));
            rr.add_cookie(OutCookie::new("leak", "1", None).unwrap());
            rr.add_parameter("leak", "1");
            rr.consume_path(3);
            Ok(ClauseOutcome::NoMatch)
        }
        fn name(&self) -> &'static str {
            "leave_traces"
        }
        fn argument(&self) -> String {
            String::new()
        }
        fn route_block(&self) -> Option<&RouteBlock> {
            None
        }
        fn prototype(&self) -> Box<dyn RouterClause> {
            Box::new(LeaveTraces)
        }
    }

    struct Fails;

    impl RouterClause for Fails {
        fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
            Err(RouteError::Clause {
                clause: "fails",
                reason: "store down".into(),
            })
        }
        fn name(&self) -> &'static str {
            "fails"
        }
        fn argument(&self) -> String {
            String::new()
        }
        fn route_block(&self) -> Option<&RouteBlock> {
            None
        }
        fn prototype(&self) -> Box<dyn RouterClause> {
            Box::new(Fails)
        }
    }

    /// Sets a cookie and lets the block carry on.
    struct Stamp;

    impl RouterClause for Stamp {
        fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
            rr.add_cookie(OutCookie::new("stamp", "1", None).unwrap());
            Ok(ClauseOutcome::Pass)
        }
        fn name(&self) -> &'static str {
            "stamp"
        }
        fn argument(&self) -> String {
            String::new()
        }
        fn route_block(&self) -> Option<&RouteBlock> {
            None
        }
        fn prototype(&self) -> Box<dyn RouterClause> {
            Box::new(Stamp)
        }
    }

    struct Gated {
        block: RouteBlock,
    }

    impl RouterClause for Gated {
        fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
            Ok(ClauseOutcome::Gate(&self.block))
        }
        fn name(&self) -> &'static str {
            "gated"
        }
        fn argument(&self) -> String {
            String::new()
        }
        fn route_block(&self) -> Option<&RouteBlock> {
            Some(&self.block)
        }
        fn prototype(&self) -> Box<dyn RouterClause> {
            Box::new(Gated { block: RouteBlock::new() })
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl RouterClause for Counting {
        fn route<'b>(&'b self, _rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ClauseOutcome::NoMatch)
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        fn argument(&self) -> String {
            String::new()
        }
        fn route_block(&self) -> Option<&RouteBlock> {
            None
        }
        fn prototype(&self) -> Box<dyn RouterClause> {
            Box::new(Counting(Arc::default()))
        }
    }

    fn resolve(block: &RouteBlock, path: &str) -> Option<String> {
        let mut ctx = test_context(path);
        let mut rr = RouteRequest::new(&mut ctx, false);
        block.route(&mut rr).unwrap().map(|t| t.name().to_string())
    }

    #[test]
    fn test_failed_clause_leaves_no_trace() {
        let mut root = RouteBlock::new();
        root.add(LeaveTraces);
        root.add_location_return("/ok", named("ok"));

        let mut ctx = test_context("/ok");
        let mut rr = RouteRequest::new(&mut ctx, false);
        let terminal = root.route(&mut rr).unwrap();
        assert_eq!(terminal.unwrap().name(), "ok");

        let result = rr.route_result();
        assert!(result.headers.is_empty());
        assert!(result.cookies.is_empty());
        assert!(result.parameter("leak").is_none());
    }

    #[test]
    fn test_failed_sub_block_leaves_no_trace() {
        let mut root = RouteBlock::new();
        root.location("/a", |a| {
            a.add(LeaveTraces);
            a.add(Stamp);
            a.add_location_return("/never", named("never"));
        });
        root.add_location_forward("/", named("fallback"));

        let mut ctx = test_context("/a/b");
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "fallback");
        let result = rr.route_result();
        assert!(result.cookies.is_empty());
        assert!(result.headers.is_empty());
        assert_eq!(result.preceding_path, "/");
    }

    #[test]
    fn test_return_requires_full_consumption() {
        let mut root = RouteBlock::new();
        root.add_location_return("/a", named("a"));

        assert_eq!(resolve(&root, "/a").as_deref(), Some("a"));
        assert_eq!(resolve(&root, "/a/extra"), None);
    }

    #[test]
    fn test_adding_route_keeps_earlier_routes() {
        let mut root = RouteBlock::new();
        root.add_location_return("/home/product/firmware", named("one"));
        assert_eq!(resolve(&root, "/home/product/firmware").as_deref(), Some("one"));

        root.add_location_return("/home/production/yes", named("two"));
        assert_eq!(resolve(&root, "/home/product/firmware").as_deref(), Some("one"));
        assert_eq!(resolve(&root, "/home/production/yes").as_deref(), Some("two"));
    }

    #[test]
    fn test_sibling_order_independent_for_distinct_prefixes() {
        let mut forward = RouteBlock::new();
        forward.add_location_return("/x", named("x"));
        forward.add_location_return("/y", named("y"));
        let mut backward = RouteBlock::new();
        backward.add_location_return("/y", named("y"));
        backward.add_location_return("/x", named("x"));

        for table in [&forward, &backward] {
            assert_eq!(resolve(table, "/x").as_deref(), Some("x"));
            assert_eq!(resolve(table, "/y").as_deref(), Some("y"));
        }
    }

    #[test]
    fn test_first_match_wins() {
        let mut root = RouteBlock::new();
        root.add_location_forward("/", named("first"));
        root.add_location_forward("/", named("second"));

        assert_eq!(resolve(&root, "/z").as_deref(), Some("first"));
    }

    #[test]
    fn test_nested_blocks() {
        let mut root = RouteBlock::new();
        root.location("/test1", |t| {
            t.add_location_return("/test2", named("h"));
        });

        assert_eq!(resolve(&root, "/test1/test2").as_deref(), Some("h"));
        assert_eq!(resolve(&root, "/test1"), None);
        assert_eq!(resolve(&root, "/test1/other"), None);
    }

    #[test]
    fn test_error_stops_routing() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut root = RouteBlock::new();
        root.location("/a", |a| {
            a.add(Fails);
        });
        root.add(Counting(seen.clone()));
        root.add_location_forward("/", named("fallback"));

        let mut ctx = test_context("/a");
        let mut rr = RouteRequest::new(&mut ctx, false);
        let err = root.route(&mut rr).unwrap_err();
        assert!(matches!(err, RouteError::Clause { clause: "fails", .. }));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pass_effects_survive_later_failures() {
        let mut root = RouteBlock::new();
        root.add(Stamp);
        root.add(LeaveTraces);
        root.add_location_return("/p", named("p"));

        let mut ctx = test_context("/p");
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "p");
        let result = rr.route_result();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].name(), "stamp");
        assert!(result.headers.is_empty());
    }

    #[test]
    fn test_gate_denies_later_siblings() {
        let mut login = RouteBlock::new();
        login.add_location_return("/login", named("login"));

        let mut root = RouteBlock::new();
        root.add(Gated { block: login });
        root.add_location_forward("/", named("protected"));

        assert_eq!(resolve(&root, "/login").as_deref(), Some("login"));
        assert_eq!(resolve(&root, "/secret"), None);
    }

    #[test]
    fn test_block_as_clause_descends() {
        let mut inner = RouteBlock::new();
        inner.add_location_return("/in", named("in"));
        let mut root = RouteBlock::new();
        root.add(inner);

        assert_eq!(resolve(&root, "/in").as_deref(), Some("in"));
        assert_eq!(root.audit()[0].name, "block");
    }

    #[test]
    fn test_empty_block_no_match() {
        let root = RouteBlock::new();
        let mut ctx = test_context("/");
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert!(root.route(&mut rr).unwrap().is_none());
        assert_eq!(rr.depth(), 0);
    }
}
