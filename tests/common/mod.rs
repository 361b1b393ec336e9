//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

use gatehouse::config::{AppConfig, UserConfig};
use gatehouse::http::{Dispatcher, HttpServer};
use gatehouse::lifecycle::{startup, Shutdown};
use gatehouse::session::RamSessionServer;
use gatehouse::stream::{DriverError, StreamDriver};

pub const USER: &str = "alice";
pub const PASSWORD: &str = "wonderland";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.users.push(UserConfig {
        username: USER.into(),
        password: PASSWORD.into(),
    });
    config.observability.metrics_enabled = false;
    config
}

pub struct TestApp {
    pub router: Router,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<RamSessionServer>,
}

pub fn app(config: &AppConfig) -> TestApp {
    let sessions = Arc::new(startup::session_server(config).unwrap());
    let dispatcher = Arc::new(startup::dispatcher(config, sessions.clone()).unwrap());
    let router = HttpServer::new(config, dispatcher.clone()).router();
    TestApp {
        router,
        dispatcher,
        sessions,
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

pub fn login_request(path: &str, username: &str, password: &str) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={username}&password={password}")))
        .unwrap()
}

/// Log in and return the `name=value` pair of the session cookie.
pub async fn login(router: &Router) -> String {
    let response = send(router, login_request("/account/", USER, PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("session="))
        .and_then(|c| c.split(';').next().map(str::to_string))
        .expect("session cookie")
}

/// Serve `config` on an ephemeral port.
pub async fn spawn_server(config: &AppConfig) -> (SocketAddr, TestApp, Shutdown) {
    let test_app = app(config);
    let server = HttpServer::new(config, test_app.dispatcher.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, test_app, shutdown)
}

/// A transport made of two channels.
pub struct ChannelDriver {
    incoming: mpsc::Receiver<String>,
    outgoing: mpsc::Sender<String>,
}

/// The test's ends: send frames in, read frames out.
pub fn channel_driver() -> (ChannelDriver, mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (in_tx, in_rx) = mpsc::channel(16);
    let (out_tx, out_rx) = mpsc::channel(16);
    (
        ChannelDriver {
            incoming: in_rx,
            outgoing: out_tx,
        },
        in_tx,
        out_rx,
    )
}

#[async_trait]
impl StreamDriver for ChannelDriver {
    async fn receive(&mut self) -> Result<Option<String>, DriverError> {
        Ok(self.incoming.recv().await)
    }

    async fn send(&mut self, frame: String) -> Result<(), DriverError> {
        self.outgoing.send(frame).await.map_err(|_| DriverError::Closed)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
