//! What a transport must provide to carry a stream.
//!
//! One discrete text frame in, one out, at a time. Framing of events and
//! stream requests above this lives in `http::bridge`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport closed")]
    Closed,

    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait StreamDriver: Send {
    /// Next frame from the peer; `Ok(None)` on orderly close.
    async fn receive(&mut self) -> Result<Option<String>, DriverError>;

    async fn send(&mut self, frame: String) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}
