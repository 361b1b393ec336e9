//! Terminal handlers yielded by routing.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};

use crate::http::{RequestContext, ResponseWriter};

/// Serves an HTTP request once routing has picked it.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, ctx: &mut RequestContext, rw: &mut ResponseWriter);

    /// A handler that may stream is run on its own task, so it can keep
    /// working after the response has gone out.
    fn may_stream(&self) -> bool {
        false
    }

    /// Used in route audits and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Serves a request that arrived over an existing stream.
///
/// The handler answers through [`RequestContext::stream_response`].
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle_stream(&self, ctx: &mut RequestContext);

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A handler from a synchronous closure.
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseWriter) + Send + Sync,
{
    async fn serve(&self, ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        (self.f)(ctx, rw)
    }

    fn name(&self) -> &str {
        self.name
    }
}

pub fn handler_fn<F>(name: &'static str, f: F) -> Arc<dyn Handler>
where
    F: Fn(&RequestContext, &mut ResponseWriter) + Send + Sync + 'static,
{
    Arc::new(FnHandler { name, f })
}

/// Always answers with the same status and body.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    status: StatusCode,
    content_type: HeaderValue,
    body: Bytes,
}

impl StaticResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: HeaderValue::from_static(content_type),
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, "text/plain; charset=utf-8", body)
    }

    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, "text/html; charset=utf-8", body)
    }
}

#[async_trait]
impl Handler for StaticResponse {
    async fn serve(&self, _ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        rw.set_status(self.status);
        rw.headers_mut()
            .insert(header::CONTENT_TYPE, self.content_type.clone());
        rw.write(&self.body);
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Plain 404.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn serve(&self, _ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        rw.set_status(StatusCode::NOT_FOUND);
        rw.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        rw.write(b"404 page not found\n");
    }

    fn name(&self) -> &str {
        "not_found"
    }
}

#[async_trait]
impl StreamHandler for NotFound {
    async fn handle_stream(&self, ctx: &mut RequestContext) {
        ctx.stream_response(crate::http::StreamRequestResult::error(
            StatusCode::NOT_FOUND,
            "stream handler not found",
        ));
    }

    fn name(&self) -> &str {
        "not_found"
    }
}
