//! Per-request context handed to clauses and handlers.
//!
//! # Responsibilities
//! - Hold the parsed request (path, headers, form values, verified cookies)
//! - Carry the bound session, starting anonymous
//! - Open the session's stream lazily, only for handlers running on their
//!   own task or requests that arrived over a stream
//! - Record authentication outcomes for login pages
//!
//! # Design Decisions
//! - Binding a different session expires the one it replaces
//! - Stream requests answer through a one-shot responder; only the first
//!   answer is delivered

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, request, HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cookie::{parse_cookies, InCookies};
use crate::identity::{AuthError, Identity};
use crate::routing::RouteResult;
use crate::session::{
    sign_stream_id, AnonymousSession, Session, SessionError, SessionId, SessionServer,
    SESSION_COOKIE,
};
use crate::stream::{
    ReceiveOnlySubstream, SendOnlySubstream, Stream, StreamError, Substream, SubstreamId,
};

use super::X_REQUEST_ID;

/// Answer to a request that arrived over a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequestResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substream_id: Option<SubstreamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
}

impl StreamRequestResult {
    pub fn opened(substream_id: SubstreamId) -> Self {
        Self {
            substream_id: Some(substream_id),
            ..Self::default()
        }
    }

    pub fn error(status: axum::http::StatusCode, message: impl Into<String>) -> Self {
        Self {
            substream_id: None,
            error: Some(message.into()),
            error_code: Some(status.as_u16()),
        }
    }
}

pub type StreamResponder = oneshot::Sender<StreamRequestResult>;

pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    form: HashMap<String, String>,
    cookies: InCookies,
    failed_cookies: Vec<String>,
    request_id: String,
    session: Arc<dyn Session>,
    sessions: Arc<dyn SessionServer>,
    route_result: RouteResult,
    stream: Option<Stream>,
    running_as_task: bool,
    responder: Option<StreamResponder>,
    auth_error: Option<AuthError>,
    just_authenticated: bool,
}

impl RequestContext {
    /// Build the context for a plain HTTP request.
    pub fn new(parts: request::Parts, body: Bytes, sessions: Arc<dyn SessionServer>) -> Self {
        let lines = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        let (cookies, failed_cookies) = parse_cookies(lines, sessions.as_ref());

        let form = parse_form(&parts.uri, &parts.headers, &body);
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            form,
            cookies,
            failed_cookies,
            request_id,
            session: Arc::new(AnonymousSession::new()),
            sessions,
            route_result: RouteResult::default(),
            stream: None,
            running_as_task: false,
            responder: None,
            auth_error: None,
            just_authenticated: false,
        }
    }

    /// Build the context for a request that arrived over `stream`, which
    /// belongs to `session`.
    pub fn for_stream(
        parts: request::Parts,
        body: Bytes,
        session: Arc<dyn Session>,
        stream: Stream,
        sessions: Arc<dyn SessionServer>,
        responder: StreamResponder,
    ) -> Self {
        let mut ctx = Self::new(parts, body, sessions);
        ctx.session = session;
        ctx.stream = Some(stream);
        ctx.running_as_task = true;
        ctx.responder = Some(responder);
        ctx
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// A form field from the urlencoded body, else from the query string.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    pub fn cookies(&self) -> &InCookies {
        &self.cookies
    }

    /// Signed cookies that failed verification.
    pub fn failed_cookies(&self) -> &[String] {
        &self.failed_cookies
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn sessions(&self) -> &Arc<dyn SessionServer> {
        &self.sessions
    }

    pub fn identity(&self) -> Identity {
        self.session.identity()
    }

    /// Bind `session` to this request. A different session that was bound
    /// before is expired, along with its streams.
    pub fn set_session(&mut self, session: Arc<dyn Session>) {
        let same = match (self.session.session_id(), session.session_id()) {
            (Some(old), Some(new)) => old == new,
            _ => false,
        };
        if !same {
            self.session.expire();
            self.stream = None;
        }
        self.session = session;
    }

    /// The session named by a verified session cookie, if it still exists.
    pub fn session_from_cookie(&self) -> Result<Option<Arc<dyn Session>>, SessionError> {
        let Some(cookie) = self.cookies.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        match self.sessions.get_session(&SessionId::new(cookie.value())) {
            Ok(session) => Ok(Some(session)),
            Err(SessionError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn route_result(&self) -> &RouteResult {
        &self.route_result
    }

    pub(crate) fn set_route_result(&mut self, result: RouteResult) {
        self.route_result = result;
    }

    pub fn is_running_as_task(&self) -> bool {
        self.running_as_task
    }

    pub(crate) fn set_running_as_task(&mut self) {
        self.running_as_task = true;
    }

    /// The stream for this request, opened from the session on first use.
    pub fn stream(&mut self) -> Result<Stream, StreamError> {
        if !self.running_as_task {
            return Err(StreamError::NoStreamingContext);
        }
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }
        let stream = self.session.new_stream().map_err(|e| {
            tracing::debug!(request_id = %self.request_id, error = %e, "Cannot open stream");
            StreamError::NoStreamingContext
        })?;
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// The stream's ID signed for handing to the client.
    pub fn signed_stream_id(&mut self) -> Result<String, StreamError> {
        let stream = self.stream()?;
        sign_stream_id(self.session.as_ref(), stream.id())
            .map_err(|_| StreamError::NoStreamingContext)
    }

    pub async fn substream_to_user(&mut self) -> Result<SendOnlySubstream, StreamError> {
        self.stream()?.substream_to_user().await
    }

    pub async fn substream_from_user(&mut self) -> Result<ReceiveOnlySubstream, StreamError> {
        self.stream()?.substream_from_user().await
    }

    pub async fn substream(&mut self) -> Result<Substream, StreamError> {
        self.stream()?.substream().await
    }

    /// True for a stream request that has not been answered yet.
    pub fn awaiting_stream_response(&self) -> bool {
        self.responder.is_some()
    }

    /// Answer a stream request. Later answers are dropped.
    pub fn stream_response(&mut self, result: StreamRequestResult) {
        match self.responder.take() {
            Some(responder) => {
                if responder.send(result).is_err() {
                    tracing::debug!(request_id = %self.request_id, "Stream requester went away");
                }
            }
            None => {
                tracing::debug!(
                    request_id = %self.request_id,
                    result = ?result,
                    "Dropping stream response; none expected"
                );
            }
        }
    }

    pub fn auth_error(&self) -> Option<&AuthError> {
        self.auth_error.as_ref()
    }

    pub fn set_auth_error(&mut self, error: AuthError) {
        self.auth_error = Some(error);
    }

    /// True when this request logged in with a password.
    pub fn just_authenticated(&self) -> bool {
        self.just_authenticated
    }

    pub fn mark_just_authenticated(&mut self) {
        self.just_authenticated = true;
    }
}

fn parse_form(uri: &Uri, headers: &HeaderMap, body: &Bytes) -> HashMap<String, String> {
    let mut form = HashMap::new();

    let urlencoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if urlencoded {
        for (k, v) in url::form_urlencoded::parse(body) {
            form.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
    }
    if let Some(query) = uri.query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            form.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
    }
    form
}

#[cfg(test)]
pub(crate) fn test_sessions() -> Arc<crate::session::RamSessionServer> {
    Arc::new(crate::session::RamSessionServer::new(
        crate::session::SessionIdGenerator::ephemeral(),
        std::time::Duration::from_secs(3600),
        crate::stream::StreamOptions::default(),
    ))
}

#[cfg(test)]
pub(crate) fn test_context(path: &str) -> RequestContext {
    let (parts, _) = axum::http::Request::builder()
        .uri(path)
        .body(())
        .unwrap()
        .into_parts();
    RequestContext::new(parts, Bytes::new(), test_sessions())
}
