//! Response writer handed to handlers.
//!
//! # Responsibilities
//! - Collect status, headers, cookies and body from the handler
//! - Render cookies and apply security headers when the response goes out
//! - Hand the finished response to whoever is waiting on it
//!
//! # Design Decisions
//! - Security headers are applied last, after the routing table's headers
//!   and after anything the handler set, so they cannot be weakened
//! - Dropping an unfinished writer finishes it, except while unwinding
//!   from a panic so the waiter sees the failure instead of an empty 200
//! - A streaming body sends the head immediately; chunks follow as sent

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::cookie::OutCookie;
use crate::security::{apply_security_headers, SecurityHole};
use crate::stream::StreamError;

const BODY_CHUNK_BUFFER: usize = 16;

pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<OutCookie>,
    body: Vec<u8>,
    holes: Vec<SecurityHole>,
    done: Option<oneshot::Sender<Response>>,
}

impl ResponseWriter {
    /// A writer and the receiver its finished response is delivered to.
    pub fn new() -> (Self, oneshot::Receiver<Response>) {
        let (done, rx) = oneshot::channel();
        let rw = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            holes: Vec::new(),
            done: Some(done),
        };
        (rw, rx)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Replaces a cookie of the same name set earlier.
    pub fn set_cookie(&mut self, cookie: OutCookie) {
        self.cookies.retain(|c| c.name() != cookie.name());
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[OutCookie] {
        &self.cookies
    }

    pub(crate) fn set_security_holes(&mut self, holes: Vec<SecurityHole>) {
        self.holes = holes;
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_none()
    }

    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        if self.is_finished() {
            tracing::warn!(status = %self.status, "Write after response finished");
            return;
        }
        self.body.extend_from_slice(data.as_ref());
    }

    /// Serialize `value` as the body and set the JSON content type.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_vec(value)?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.write(encoded);
        Ok(())
    }

    /// Send the response now. Later calls do nothing.
    pub fn finish(&mut self) {
        let body = Body::from(std::mem::take(&mut self.body));
        self.send(body);
    }

    /// Send the head now and return a sender for the body. `None` if the
    /// response already went out.
    pub fn finish_streaming(&mut self) -> Option<BodySender> {
        if self.is_finished() {
            return None;
        }
        let (tx, rx) = mpsc::channel::<Bytes>(BODY_CHUNK_BUFFER);
        let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        });
        if !self.body.is_empty() {
            let _ = tx.try_send(Bytes::from(std::mem::take(&mut self.body)));
        }
        self.send(Body::from_stream(chunks));
        Some(BodySender { tx })
    }

    fn send(&mut self, body: Body) {
        let Some(done) = self.done.take() else {
            return;
        };

        let mut headers = std::mem::take(&mut self.headers);
        for cookie in &self.cookies {
            let rendered = cookie
                .render()
                .map_err(|e| e.to_string())
                .and_then(|s| HeaderValue::from_str(&s).map_err(|e| e.to_string()));
            match rendered {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => {
                    tracing::warn!(cookie = cookie.name(), error = %e, "Dropping unrenderable cookie");
                }
            }
        }
        apply_security_headers(&mut headers, &self.holes);

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;

        if done.send(response).is_err() {
            tracing::debug!("Response receiver gone");
        }
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.finish();
        }
    }
}

/// Sends chunks of a streaming body.
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::Sender<Bytes>,
}

impl BodySender {
    /// Errors once the client has gone away.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), StreamError> {
        self.tx
            .send(chunk.into())
            .await
            .map_err(|_| StreamError::Closed)
    }
}
