//! gatehouse: a security-focused HTTP routing engine with a streaming REST
//! multiplexer.

// Core subsystems
pub mod app;
pub mod config;
pub mod cookie;
pub mod http;
pub mod identity;
pub mod routing;
pub mod secret;
pub mod session;
pub mod stream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::AppConfig;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::RouteBlock;
