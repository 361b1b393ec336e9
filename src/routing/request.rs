//! Per-request routing state: a stack of frames over the path.
//!
//! # Responsibilities
//! - Track how much of the path each nesting level consumed
//! - Hold each level's pending side effects (parameters, headers,
//!   cookies, security holes)
//! - Discard a level's effects when the clause that produced them fails
//!
//! # Design Decisions
//! - Frame `i + 1` starts from exactly the path frame `i` left unconsumed
//! - Writes only ever go to the current frame
//! - A checkpoint restores one frame exactly; frames pushed after it are
//!   dropped

use std::collections::HashMap;

use axum::http::{HeaderName, HeaderValue};

use super::result::RouteResult;
use super::{RouteError, MAX_DEPTH};
use crate::cookie::OutCookie;
use crate::http::RequestContext;
use crate::security::SecurityHole;

/// A header write, kept in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOp {
    Add(HeaderName, HeaderValue),
    Set(HeaderName, HeaderValue),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    /// The path this frame started with.
    path: String,
    consumed: usize,
    parameters: HashMap<String, String>,
    headers: Vec<HeaderOp>,
    cookies: Vec<OutCookie>,
    holes: Vec<SecurityHole>,
    is_final: bool,
}

impl Frame {
    fn new(path: String, is_final: bool) -> Self {
        Self {
            path,
            is_final,
            ..Self::default()
        }
    }

    fn remaining(&self) -> &str {
        self.path.get(self.consumed..).unwrap_or("")
    }
}

/// Saved state of one frame, restored when a later clause fails.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    depth: usize,
    frame: Frame,
}

/// A request being routed.
pub struct RouteRequest<'r> {
    ctx: &'r mut RequestContext,
    base_path: String,
    frames: Vec<Frame>,
    current: usize,
    trace: bool,
}

impl<'r> RouteRequest<'r> {
    pub fn new(ctx: &'r mut RequestContext, trace: bool) -> Self {
        let base_path = ctx.path().to_string();
        Self {
            frames: vec![Frame::new(base_path.clone(), false)],
            base_path,
            ctx,
            current: 0,
            trace,
        }
    }

    pub fn context(&self) -> &RequestContext {
        self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        self.ctx
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Nesting level of the current frame.
    pub fn depth(&self) -> usize {
        self.current
    }

    fn frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    /// Push a frame starting where the current one left off.
    pub(crate) fn advance(&mut self) -> Result<(), RouteError> {
        if self.current + 1 > MAX_DEPTH {
            return Err(RouteError::TooDeep(MAX_DEPTH));
        }
        let next = Frame::new(self.frame().remaining().to_string(), self.frame().is_final);
        self.current += 1;
        self.frames.truncate(self.current);
        self.frames.push(next);
        Ok(())
    }

    /// Pop the current frame. Only called to undo an `advance`.
    pub(crate) fn retreat(&mut self) {
        self.frames.truncate(self.current);
        self.current = self.current.saturating_sub(1);
    }

    /// Snapshot the current frame.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            depth: self.current,
            frame: self.frame().clone(),
        }
    }

    /// Undo everything recorded since `checkpoint` was taken, including
    /// any frames pushed after it.
    pub(crate) fn restore(&mut self, checkpoint: &Checkpoint) {
        self.current = checkpoint.depth;
        self.frames.truncate(self.current);
        self.frames.push(checkpoint.frame.clone());
    }

    /// The path the current frame started with.
    pub fn current_path(&self) -> &str {
        &self.frame().path
    }

    /// The path not yet consumed by any frame.
    pub fn remaining_path(&self) -> &str {
        self.frame().remaining()
    }

    /// Mark `n` more bytes of the current frame's path as matched.
    pub fn consume_path(&mut self, n: usize) {
        let frame = self.frame_mut();
        frame.consumed = (frame.consumed + n).min(frame.path.len());
    }

    pub fn consume_entire_path(&mut self) {
        let frame = self.frame_mut();
        frame.consumed = frame.path.len();
    }

    /// The prefix of the original path matched so far.
    pub fn path_consumed(&self) -> &str {
        let consumed: usize = self.frames[..=self.current].iter().map(|f| f.consumed).sum();
        self.base_path.get(..consumed).unwrap_or(&self.base_path)
    }

    /// Declare the request fully routed regardless of remaining path.
    pub fn finalize(&mut self) {
        self.frame_mut().is_final = true;
    }

    pub fn is_complete(&self) -> bool {
        let frame = self.frame();
        frame.is_final || frame.remaining().is_empty()
    }

    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.frame_mut().parameters.insert(key.into(), value.into());
    }

    /// Parameter visible on the current path, innermost frame first.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.frames[..=self.current]
            .iter()
            .rev()
            .find_map(|f| f.parameters.get(key))
            .map(String::as_str)
    }

    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.frame_mut().headers.push(HeaderOp::Add(name, value));
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.frame_mut().headers.push(HeaderOp::Set(name, value));
    }

    /// Replaces any cookie of the same name set earlier in this frame.
    pub fn add_cookie(&mut self, cookie: OutCookie) {
        let frame = self.frame_mut();
        frame.cookies.retain(|c| c.name() != cookie.name());
        frame.cookies.push(cookie);
    }

    pub fn add_security_hole(&mut self, hole: SecurityHole) {
        self.frame_mut().holes.push(hole);
    }

    /// Flatten every frame on the current path.
    pub fn route_result(&self) -> RouteResult {
        let frames = &self.frames[..=self.current];

        let mut parameters = HashMap::new();
        let mut headers = Vec::new();
        let mut cookies: Vec<OutCookie> = Vec::new();
        let mut holes = Vec::new();
        for frame in frames {
            parameters.extend(frame.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
            headers.extend(frame.headers.iter().cloned());
            for cookie in &frame.cookies {
                cookies.retain(|c| c.name() != cookie.name());
                cookies.push(cookie.clone());
            }
            holes.extend(frame.holes.iter().cloned());
        }

        let remaining = self.remaining_path().to_string();
        let preceding = self
            .base_path
            .get(..self.base_path.len() - remaining.len())
            .unwrap_or_default()
            .to_string();

        RouteResult {
            parameters,
            headers,
            cookies,
            holes,
            preceding_path: preceding,
            remaining_path: remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::test_context;

    #[test]
    fn test_advance_inherits_remaining_path() {
        let mut ctx = test_context("/a/b/c");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        rr.consume_path(2);
        assert_eq!(rr.remaining_path(), "/b/c");
        rr.advance().unwrap();
        assert_eq!(rr.current_path(), "/b/c");
        rr.consume_path(2);
        assert_eq!(rr.path_consumed(), "/a/b");
        assert_eq!(rr.remaining_path(), "/c");

        rr.retreat();
        assert_eq!(rr.remaining_path(), "/b/c");
        assert_eq!(rr.path_consumed(), "/a");
    }

    #[test]
    fn test_reset_discards_frame_effects() {
        let mut ctx = test_context("/x");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        let checkpoint = rr.checkpoint();
        rr.add_parameter("p", "1");
        rr.set_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"));
        rr.add_cookie(OutCookie::new("c", "v", None).unwrap());
        rr.add_security_hole(SecurityHole::AllowBrowserTypeGuessing);
        rr.consume_path(1);
        rr.finalize();
        rr.advance().unwrap();

        rr.restore(&checkpoint);
        assert_eq!(rr.depth(), 1);
        let result = rr.route_result();
        assert!(result.parameters.is_empty());
        assert!(result.headers.is_empty());
        assert!(result.cookies.is_empty());
        assert!(result.holes.is_empty());
        assert_eq!(rr.remaining_path(), "/x");
        assert!(!rr.is_complete());
    }

    #[test]
    fn test_result_merges_frames_in_order() {
        let mut ctx = test_context("/a/b");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        rr.add_parameter("k", "outer");
        rr.add_parameter("only_outer", "1");
        rr.add_cookie(OutCookie::new("c", "outer", None).unwrap());
        rr.consume_path(2);
        rr.advance().unwrap();
        rr.add_parameter("k", "inner");
        rr.add_cookie(OutCookie::new("c", "inner", None).unwrap());
        rr.add_header(HeaderName::from_static("x-h"), HeaderValue::from_static("1"));

        let result = rr.route_result();
        assert_eq!(result.parameters["k"], "inner");
        assert_eq!(result.parameters["only_outer"], "1");
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].value(), "inner");
        assert_eq!(result.preceding_path, "/a");
        assert_eq!(result.remaining_path, "/b");
        assert_eq!(rr.parameter("k"), Some("inner"));
    }

    #[test]
    fn test_finalize_inherited_and_restored() {
        let mut ctx = test_context("/long/path");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        let before = rr.checkpoint();
        rr.finalize();
        assert!(rr.is_complete());
        rr.advance().unwrap();
        let inner = rr.checkpoint();
        assert!(rr.is_complete());
        rr.restore(&inner);
        assert!(rr.is_complete());
        rr.restore(&before);
        assert!(!rr.is_complete());
    }

    #[test]
    fn test_restore_keeps_effects_before_checkpoint() {
        let mut ctx = test_context("/p");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        rr.add_cookie(OutCookie::new("kept", "1", None).unwrap());
        let checkpoint = rr.checkpoint();
        rr.add_cookie(OutCookie::new("dropped", "1", None).unwrap());
        rr.restore(&checkpoint);
        let names: Vec<_> = rr.route_result().cookies.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn test_consume_clamped() {
        let mut ctx = test_context("/ab");
        let mut rr = RouteRequest::new(&mut ctx, false);
        rr.advance().unwrap();
        rr.consume_path(100);
        assert_eq!(rr.remaining_path(), "");
        assert!(rr.is_complete());
        assert_eq!(rr.path_consumed(), "/ab");
    }

    #[test]
    fn test_depth_limited() {
        let mut ctx = test_context("/");
        let mut rr = RouteRequest::new(&mut ctx, false);
        for _ in 0..MAX_DEPTH {
            rr.advance().unwrap();
        }
        assert!(matches!(rr.advance(), Err(RouteError::TooDeep(_))));
    }
}
