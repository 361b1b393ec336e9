//! Streaming REST: many logical substreams over one transport.
//!
//! # Data Flow
//! ```text
//!                  ┌──────────────── Stream actor (one task) ───────────────┐
//! handler code     │                                                        │
//!   Substream ─────┼─▶ from_substreams ──▶ pending queue ──▶ to_user ───────┼─▶ transport
//!   Substream ◀────┼── per-substream channel ◀── route by dest ◀── from_user ◀─┼── transport
//!   Stream handle ─┼─▶ commands (get substream, attach, detach, stop, panic)  │
//!                  └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - The actor task owns the substream registry, the ID counter and the
//!   outbound queue; everything else talks to it through channels
//! - Commands are serviced first on every loop iteration
//! - Outbound order is FIFO per stream; substreams interleave freely
//! - Closing a substream drains its inbound channel while announcing the
//!   close, so it cannot deadlock against the actor delivering to it
//! - A panic in the actor is caught and the normal teardown still runs

pub mod commands;
pub mod driver;
pub mod events;
pub mod stream;
pub mod substream;

use thiserror::Error;

pub use driver::{DriverError, StreamDriver};
pub use events::{EventFromUser, EventToUser, SubstreamId};
pub use stream::{AttachmentId, Stream, StreamOptions};
pub use substream::{ReceiveOnlySubstream, SendOnlySubstream, Substream, SubstreamSender};

/// Errors from streams and substreams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream or substream is closed")]
    Closed,

    #[error("not running in a streaming context")]
    NoStreamingContext,

    #[error("message cannot be encoded: {0}")]
    Encode(String),
}
