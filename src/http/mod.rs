//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, body limit)
//!     → request.rs (RequestContext: cookies, form, session)
//!     → dispatch.rs (route, apply effects, run handler)
//!     → response.rs (ResponseWriter: headers, cookies, security headers last)
//!     → Send to client
//!
//! GET {websocket_path}
//!     → websocket.rs (upgrade, pick stream)
//!     → bridge.rs (frames ↔ stream events, stream requests → dispatch.rs)
//! ```

pub mod bridge;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

pub use bridge::{DriverBridge, StreamRequest};
pub use dispatch::Dispatcher;
pub use request::{RequestContext, StreamRequestResult, StreamResponder};
pub use response::{BodySender, ResponseWriter};
pub use server::{AppState, HttpServer};
pub use websocket::WebSocketDriver;
