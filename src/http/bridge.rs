//! Carries one stream over a text-frame transport.
//!
//! # Data Flow
//! ```text
//! driver.receive()
//!     → {"type":"event",...}      → stream (routed to a substream by dest)
//!     → {"type":"new_stream",...} → Dispatcher::run_streaming_route (own task)
//!                                 → {"type":"new_stream_response",...}
//! stream events to user → {"type":"event",...} → driver.send()
//! ```
//!
//! # Design Decisions
//! - The bridge owns the driver; sends and receives share one select loop
//! - The transport ending stops the stream
//! - A malformed frame is logged and skipped; a malformed stream request
//!   is answered with a 400 result

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{request, Request, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::session::Session;
use crate::stream::{
    DriverError, EventFromUser, EventToUser, Stream, StreamDriver, SubstreamId,
};

use super::{Dispatcher, RequestContext, StreamRequestResult};

const BRIDGE_BUFFER: usize = 64;

/// A request made over the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub request_id: u64,
    #[serde(default = "default_method")]
    pub method: String,
    /// Path and query.
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl StreamRequest {
    fn to_parts(&self) -> Result<(request::Parts, Bytes), axum::http::Error> {
        let mut builder = Request::builder()
            .method(self.method.as_str())
            .uri(self.path.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let (parts, ()) = builder.body(())?.into_parts();
        Ok((parts, Bytes::from(self.body.clone())))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingFrame {
    Event(EventFromUser),
    NewStream(StreamRequest),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingFrame<'a> {
    Event(&'a EventToUser),
    NewStreamResponse {
        response_to: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        substream_id: Option<SubstreamId>,
        data: &'a StreamRequestResult,
    },
}

fn encode(frame: &OutgoingFrame<'_>) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot encode outgoing frame");
            None
        }
    }
}

fn response_frame(request_id: u64, result: &StreamRequestResult) -> Option<String> {
    encode(&OutgoingFrame::NewStreamResponse {
        response_to: request_id,
        substream_id: result.substream_id,
        data: result,
    })
}

pub struct DriverBridge<D> {
    driver: D,
    link: StreamLink,
}

/// Everything but the driver, shared with request tasks.
struct StreamLink {
    stream: Stream,
    session: Arc<dyn Session>,
    dispatcher: Arc<Dispatcher>,
}

impl<D: StreamDriver> DriverBridge<D> {
    pub fn new(
        driver: D,
        stream: Stream,
        session: Arc<dyn Session>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            driver,
            link: StreamLink {
                stream,
                session,
                dispatcher,
            },
        }
    }

    /// Serve until the transport or the stream ends.
    pub async fn run(mut self) -> Result<(), DriverError> {
        let (to_user_tx, mut to_user) = mpsc::channel::<EventToUser>(BRIDGE_BUFFER);
        let (from_user, from_user_rx) = mpsc::channel::<EventFromUser>(BRIDGE_BUFFER);
        let (replies_tx, mut replies) = mpsc::channel::<String>(BRIDGE_BUFFER);

        let link = &self.link;
        if link.stream.attach(to_user_tx, from_user_rx).await.is_err() {
            let _ = self.driver.close().await;
            return Err(DriverError::Closed);
        }
        tracing::debug!(stream = link.stream.id(), "Transport attached");

        let outcome = loop {
            tokio::select! {
                event = to_user.recv() => {
                    let Some(event) = event else {
                        tracing::debug!(stream = link.stream.id(), "Stream no longer sending to this transport");
                        break Ok(());
                    };
                    if let Some(text) = encode(&OutgoingFrame::Event(&event)) {
                        if let Err(e) = self.driver.send(text).await {
                            break Err(e);
                        }
                    }
                }
                Some(reply) = replies.recv() => {
                    if let Err(e) = self.driver.send(reply).await {
                        break Err(e);
                    }
                }
                incoming = self.driver.receive() => match incoming {
                    Ok(Some(text)) => link.handle_frame(&text, &from_user, &replies_tx).await,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        // Dropping the inbound side stops the stream.
        drop(from_user);
        match &outcome {
            Ok(()) => tracing::debug!(stream = link.stream.id(), "Transport finished"),
            Err(e) => tracing::warn!(stream = link.stream.id(), error = %e, "Transport failed"),
        }
        let closed = self.driver.close().await;
        outcome.and(closed)
    }
}

impl StreamLink {
    async fn handle_frame(
        &self,
        text: &str,
        from_user: &mpsc::Sender<EventFromUser>,
        replies: &mpsc::Sender<String>,
    ) {
        let frame = match serde_json::from_str::<IncomingFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(stream = self.stream.id(), error = %e, "Skipping malformed frame");
                return;
            }
        };

        match frame {
            IncomingFrame::Event(event) => {
                if from_user.send(event).await.is_err() {
                    tracing::debug!(stream = self.stream.id(), "Stream gone; event dropped");
                }
            }
            IncomingFrame::NewStream(request) => self.start_request(request, replies.clone()),
        }
    }

    fn start_request(&self, request: StreamRequest, replies: mpsc::Sender<String>) {
        let (parts, body) = match request.to_parts() {
            Ok(converted) => converted,
            Err(e) => {
                tracing::warn!(request_id = request.request_id, error = %e, "Malformed stream request");
                let result = StreamRequestResult::error(StatusCode::BAD_REQUEST, e.to_string());
                if let Some(text) = response_frame(request.request_id, &result) {
                    let _ = replies.try_send(text);
                }
                return;
            }
        };

        let (responder, answer) = oneshot::channel();
        let ctx = RequestContext::for_stream(
            parts,
            body,
            self.session.clone(),
            self.stream.clone(),
            self.dispatcher.sessions().clone(),
            responder,
        );
        let dispatcher = self.dispatcher.clone();
        let request_id = request.request_id;

        tokio::spawn(async move {
            let route = tokio::spawn(async move { dispatcher.run_streaming_route(ctx).await });

            let result = answer.await.unwrap_or_else(|_| {
                StreamRequestResult::error(StatusCode::INTERNAL_SERVER_ERROR, "stream handler failed")
            });
            if let Some(text) = response_frame(request_id, &result) {
                if replies.send(text).await.is_err() {
                    tracing::debug!(request_id, "Transport gone before stream response");
                }
            }

            if let Err(e) = route.await {
                if e.is_panic() {
                    crate::observability::metrics::handler_panicked();
                    tracing::error!(request_id, "Stream handler panicked");
                }
            }
        });
    }
}
