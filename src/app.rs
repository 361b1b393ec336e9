//! The bundled application: a public index, a password-protected account
//! area, a live counter streamed over the session's stream, and an echo
//! service reachable only as a stream request.
//!
//! ```text
//! /                      index
//! /account/...           CookieAuth → login form, or
//!   /account/counter       counter (streams ticks after responding)
//!   /account/...           account page
//! /echo (stream request) echo every message back
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use serde_json::json;

use crate::http::{RequestContext, ResponseWriter, StreamRequestResult};
use crate::identity::{CookieAuth, PasswordAuthenticator};
use crate::routing::{ForwardClause, Handler, RouteBlock, StaticResponse, StreamHandler};

const INDEX: &str = "<!doctype html>\n<title>gatehouse</title>\n\
<h1>gatehouse</h1>\n<p><a href=\"/account/\">Your account</a></p>\n";

/// Build the routing table.
pub fn routes(passwords: Arc<dyn PasswordAuthenticator>, insecure_cookies: bool) -> RouteBlock {
    let mut login = RouteBlock::new();
    login.add(ForwardClause::new(Arc::new(LoginPage)));

    let mut root = RouteBlock::new();
    root.add_exact_return("/", Arc::new(StaticResponse::html(INDEX)));
    root.location("/account", |account| {
        account.add(CookieAuth::new(login, passwords).insecure(insecure_cookies));
        account.add_exact_return(
            "/counter",
            Arc::new(Counter {
                ticks: 10,
                interval: Duration::from_secs(1),
            }),
        );
        account.add(ForwardClause::new(Arc::new(AccountPage)));
    });
    root.add_stream_forward("/echo", Arc::new(Echo));
    root
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn html(rw: &mut ResponseWriter, status: StatusCode, body: &str) {
    rw.set_status(status);
    rw.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    rw.write(body);
}

/// The form shown in place of any protected page.
pub struct LoginPage;

#[async_trait]
impl Handler for LoginPage {
    async fn serve(&self, ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        let (status, notice) = match ctx.auth_error() {
            Some(e) if !e.may_try_again() => {
                html(rw, StatusCode::FORBIDDEN, &format!("<p>{}</p>\n", escape_html(&e.to_string())));
                return;
            }
            Some(e) if !e.is_no_auth_given() => (
                StatusCode::UNAUTHORIZED,
                format!("<p class=\"error\">{}</p>\n", escape_html(&e.to_string())),
            ),
            _ => (StatusCode::UNAUTHORIZED, String::new()),
        };
        let body = format!(
            "<!doctype html>\n<title>Log in</title>\n{notice}\
<form method=\"post\">\n\
<input name=\"username\" autocomplete=\"username\">\n\
<input name=\"password\" type=\"password\" autocomplete=\"current-password\">\n\
<button>Log in</button>\n</form>\n"
        );
        html(rw, status, &body);
    }

    fn name(&self) -> &str {
        "login"
    }
}

pub struct AccountPage;

#[async_trait]
impl Handler for AccountPage {
    async fn serve(&self, ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        if ctx.just_authenticated() {
            // Turn the login POST into a GET of the same page.
            rw.set_status(StatusCode::SEE_OTHER);
            if let Ok(location) = HeaderValue::from_str(ctx.path()) {
                rw.headers_mut().insert(header::LOCATION, location);
            }
            return;
        }
        let body = format!(
            "<!doctype html>\n<title>Account</title>\n<p>Logged in as {}.</p>\n",
            escape_html(&ctx.identity().log_name())
        );
        html(rw, StatusCode::OK, &body);
    }

    fn name(&self) -> &str {
        "account"
    }
}

/// Answers with the substream to watch, then sends `ticks` counts on it.
pub struct Counter {
    pub ticks: u64,
    pub interval: Duration,
}

#[async_trait]
impl Handler for Counter {
    async fn serve(&self, ctx: &mut RequestContext, rw: &mut ResponseWriter) {
        let stream_id = match ctx.signed_stream_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id(), error = %e, "Counter has no stream");
                rw.set_status(StatusCode::SERVICE_UNAVAILABLE);
                rw.write("streaming unavailable\n");
                return;
            }
        };
        let mut substream = match ctx.substream_to_user().await {
            Ok(substream) => substream,
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id(), error = %e, "Cannot open counter substream");
                rw.set_status(StatusCode::SERVICE_UNAVAILABLE);
                rw.write("streaming unavailable\n");
                return;
            }
        };

        let answer = json!({ "stream_id": stream_id, "substream_id": substream.id() });
        if let Err(e) = rw.write_json(&answer) {
            tracing::error!(error = %e, "Cannot encode counter answer");
        }
        rw.finish();

        for count in 1..=self.ticks {
            tokio::time::sleep(self.interval).await;
            if substream.send(json!({ "count": count })).await.is_err() {
                return;
            }
        }
        let _ = substream.close().await;
    }

    fn may_stream(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "counter"
    }
}

/// Sends every message on its substream back to the user.
pub struct Echo;

#[async_trait]
impl StreamHandler for Echo {
    async fn handle_stream(&self, ctx: &mut RequestContext) {
        let mut substream = match ctx.substream().await {
            Ok(substream) => substream,
            Err(e) => {
                ctx.stream_response(StreamRequestResult::error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    e.to_string(),
                ));
                return;
            }
        };
        ctx.stream_response(StreamRequestResult::opened(substream.id()));

        while let Ok(message) = substream.receive().await {
            if substream.send(message).await.is_err() {
                break;
            }
        }
        tracing::debug!(substream = substream.id(), "Echo finished");
    }

    fn name(&self) -> &str {
        "echo"
    }
}
