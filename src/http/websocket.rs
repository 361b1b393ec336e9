//! Stream transport over a websocket.
//!
//! # Data Flow
//! ```text
//! GET {websocket_path}[?stream=<signed id>]
//!     → session from the signed session cookie (403 without one)
//!     → resume the named stream (404 if unknown) or open a new one
//!     → upgrade → {"type":"stream","stream_id":...} → DriverBridge::run
//! ```
//!
//! # Design Decisions
//! - Only text frames carry stream traffic; binary and ping frames are skipped
//! - The first frame names the signed stream ID so the client can resume

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::session::{sign_stream_id, Session, SessionError};
use crate::stream::{DriverError, Stream, StreamDriver};

use super::{AppState, Dispatcher, DriverBridge, RequestContext};

pub struct WebSocketDriver {
    socket: WebSocket,
    closed: bool,
}

impl WebSocketDriver {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

#[async_trait]
impl StreamDriver for WebSocketDriver {
    async fn receive(&mut self) -> Result<Option<String>, DriverError> {
        loop {
            match self.socket.recv().await {
                None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Err(e)) => return Err(DriverError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))
    }
}

fn requested_stream(parts: &request::Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "stream")
        .map(|(_, value)| value.into_owned())
}

pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    parts: request::Parts,
) -> Response {
    let requested = requested_stream(&parts);
    let ctx = RequestContext::new(parts, Bytes::new(), state.dispatcher.sessions().clone());

    let session = match ctx.session_from_cookie() {
        Ok(Some(session)) => session,
        Ok(None) => return (StatusCode::FORBIDDEN, "no session").into_response(),
        Err(e) => {
            tracing::error!(request_id = ctx.request_id(), error = %e, "Session lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let stream = match &requested {
        Some(signed) => session.get_stream(signed.as_bytes()),
        None => session.new_stream(),
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(SessionError::StreamNotFound) => {
            return (StatusCode::NOT_FOUND, "stream not found").into_response()
        }
        Err(e) => {
            tracing::warn!(request_id = ctx.request_id(), error = %e, "Cannot open stream");
            return (StatusCode::NOT_FOUND, "stream not available").into_response();
        }
    };
    let signed_id = match sign_stream_id(session.as_ref(), stream.id()) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(request_id = ctx.request_id(), error = %e, "Cannot sign stream ID");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::info!(
        request_id = ctx.request_id(),
        stream = stream.id(),
        resumed = requested.is_some(),
        "Stream transport upgrading"
    );
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        serve_transport(WebSocketDriver::new(socket), signed_id, stream, session, dispatcher)
    })
}

/// Announce the signed stream ID, then bridge the transport until it ends.
async fn serve_transport<D: StreamDriver>(
    mut driver: D,
    signed_id: String,
    stream: Stream,
    session: Arc<dyn Session>,
    dispatcher: Arc<Dispatcher>,
) {
    let hello = serde_json::json!({ "type": "stream", "stream_id": signed_id }).to_string();
    if let Err(e) = driver.send(hello).await {
        tracing::debug!(stream = stream.id(), error = %e, "Transport closed before the stream started");
        if let Err(e) = stream.close() {
            tracing::debug!(stream = stream.id(), error = %e, "Stream already closed");
        }
        return;
    }
    if let Err(e) = DriverBridge::new(driver, stream, session, dispatcher).run().await {
        tracing::debug!(error = %e, "Stream transport ended with error");
    }
}
