//! Top-level dispatch: route, apply the routing table's effects, serve.
//!
//! # Responsibilities
//! - Delete signed cookies that failed verification
//! - Resolve the handler, answering 404 on no match and 500 on a routing
//!   error
//! - Apply headers, then cookies, then security holes from the winning path
//! - Run handlers that may stream on their own task, re-raising a panic
//!   on the request task so the outer panic layer sees it
//! - Answer stream requests arriving over a stream transport

use std::panic;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::Response;

use crate::cookie::OutCookie;
use crate::observability::metrics;
use crate::routing::{
    ClauseDescription, Handler, NotFound, RouteBlock, RouteError, RouteRequest, RouteResult,
    Terminal,
};
use crate::session::SessionServer;

use super::{RequestContext, ResponseWriter, StreamRequestResult};

/// Owns the routing table and serves requests against it.
pub struct Dispatcher {
    root: RouteBlock,
    sessions: Arc<dyn SessionServer>,
    trace: bool,
    insecure_cookies: bool,
}

impl Dispatcher {
    pub fn new(root: RouteBlock, sessions: Arc<dyn SessionServer>) -> Self {
        Self {
            root,
            sessions,
            trace: false,
            insecure_cookies: false,
        }
    }

    /// Log every clause evaluation at debug level.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Issue cookies the dispatcher creates without the Secure attribute.
    pub fn with_insecure_cookies(mut self, insecure: bool) -> Self {
        self.insecure_cookies = insecure;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionServer> {
        &self.sessions
    }

    pub fn audit(&self) -> Vec<ClauseDescription> {
        self.root.audit()
    }

    /// Route without serving.
    pub fn resolve(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<Option<(Terminal, RouteResult)>, RouteError> {
        let mut rr = RouteRequest::new(ctx, self.trace);
        let terminal = self.root.route(&mut rr)?;
        Ok(terminal.map(|t| (t, rr.route_result())))
    }

    /// Serve one HTTP request.
    pub async fn handle(&self, mut ctx: RequestContext) -> Response {
        let start = Instant::now();
        let (mut rw, done) = ResponseWriter::new();

        for name in ctx.failed_cookies() {
            match OutCookie::nonstandard(name.as_str(), "", None) {
                Ok(cookie) => {
                    let cookie = cookie.delete();
                    rw.set_cookie(if self.insecure_cookies { cookie.insecure() } else { cookie });
                }
                Err(e) => tracing::debug!(cookie = %name, error = %e, "Cannot delete cookie"),
            }
        }

        let (handler, result) = match self.resolve(&mut ctx) {
            Ok(Some((Terminal::Handler(handler), result))) => (handler, result),
            Ok(_) => {
                tracing::debug!(request_id = %ctx.request_id(), path = ctx.path(), "No route matched");
                metrics::record_route("not_found", start);
                NotFound.serve(&mut ctx, &mut rw).await;
                rw.finish();
                return done.await.unwrap_or_else(|_| internal_error());
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    path = ctx.path(),
                    error = %e,
                    "Routing failed"
                );
                metrics::record_route("error", start);
                rw.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                rw.write("internal server error\n");
                rw.finish();
                return done.await.unwrap_or_else(|_| internal_error());
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            path = ctx.path(),
            handler = handler.name(),
            user = %ctx.identity().log_name(),
            "Route matched"
        );
        metrics::record_route("matched", start);

        result.apply_headers(rw.headers_mut());
        for cookie in &result.cookies {
            rw.set_cookie(cookie.clone());
        }
        rw.set_security_holes(result.holes.clone());
        ctx.set_route_result(result);

        if !handler.may_stream() {
            handler.serve(&mut ctx, &mut rw).await;
            rw.finish();
            return done.await.unwrap_or_else(|_| internal_error());
        }

        ctx.set_running_as_task();
        let name = handler.name().to_string();
        let request_id = ctx.request_id().to_string();
        let task = tokio::spawn(async move {
            handler.serve(&mut ctx, &mut rw).await;
            rw.finish();
        });

        match done.await {
            Ok(response) => {
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        if e.is_panic() {
                            metrics::handler_panicked();
                            tracing::error!(
                                request_id = %request_id,
                                handler = %name,
                                "Streaming handler panicked after responding"
                            );
                        }
                    }
                });
                response
            }
            Err(_) => match task.await {
                Err(e) if e.is_panic() => {
                    metrics::handler_panicked();
                    tracing::error!(
                        request_id = %request_id,
                        handler = %name,
                        "Streaming handler panicked"
                    );
                    panic::resume_unwind(e.into_panic())
                }
                _ => internal_error(),
            },
        }
    }

    /// Serve one request that arrived over a stream. The answer goes out
    /// through the context's responder.
    pub async fn run_streaming_route(&self, mut ctx: RequestContext) {
        let handler = match self.resolve(&mut ctx) {
            Ok(Some((Terminal::Stream(handler), result))) => {
                ctx.set_route_result(result);
                handler
            }
            Ok(_) => {
                ctx.stream_response(StreamRequestResult::error(
                    StatusCode::NOT_FOUND,
                    "stream handler not found",
                ));
                return;
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    path = ctx.path(),
                    error = %e,
                    "Routing stream request failed"
                );
                ctx.stream_response(StreamRequestResult::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "routing failed",
                ));
                return;
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            path = ctx.path(),
            handler = handler.name(),
            "Stream request routed"
        );
        handler.handle_stream(&mut ctx).await;

        if ctx.awaiting_stream_response() {
            tracing::warn!(
                request_id = %ctx.request_id(),
                handler = handler.name(),
                "Stream handler returned without answering"
            );
            ctx.stream_response(StreamRequestResult::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "stream handler did not open a stream",
            ));
        }
    }
}

fn internal_error() -> Response {
    let mut response = Response::new(axum::body::Body::from("internal server error\n"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
