//! The cookie authentication gate.

use std::sync::Arc;

use crate::cookie::OutCookie;
use crate::routing::{ClauseOutcome, RouteBlock, RouteError, RouteRequest, RouterClause};
use crate::session::{SESSION_COOKIE, Session};

use super::{Identity, Normalized, PasswordAuthenticator};

/// Requires a session before routing continues.
///
/// A verified session cookie binds its session and passes. Without one,
/// the `username` and `password` form fields are tried; success opens a
/// new session, sets its cookie and passes. Anything else routes into the
/// auth block, and if that block does not match, the request goes no
/// further in the enclosing block.
pub struct CookieAuth {
    auth_block: RouteBlock,
    passwords: Arc<dyn PasswordAuthenticator>,
    insecure: bool,
}

impl CookieAuth {
    pub fn new(auth_block: RouteBlock, passwords: Arc<dyn PasswordAuthenticator>) -> Self {
        Self {
            auth_block,
            passwords,
            insecure: false,
        }
    }

    /// Issue session cookies without the Secure attribute, for plain HTTP.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    fn password_login<'b>(
        &'b self,
        rr: &mut RouteRequest<'_>,
    ) -> Result<ClauseOutcome<'b>, RouteError> {
        let ctx = rr.context_mut();
        let username = Normalized::new(ctx.form_value("username").unwrap_or_default());
        let password = Normalized::new(ctx.form_value("password").unwrap_or_default());

        let authentication = match self.passwords.authenticate(&username, &password) {
            Ok(authentication) => authentication,
            Err(e) => {
                if !e.is_no_auth_given() {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        username = %username,
                        error = %e,
                        "Password authentication failed"
                    );
                }
                ctx.set_auth_error(e);
                return Ok(ClauseOutcome::Gate(&self.auth_block));
            }
        };

        let session = ctx.sessions().new_session(Identity::new(authentication))?;
        tracing::info!(
            request_id = %ctx.request_id(),
            user = %session.identity().log_name(),
            "Session established"
        );
        ctx.set_session(session.clone());
        ctx.mark_just_authenticated();

        if let Some(cookie) = session_cookie(session.as_ref(), self.insecure)? {
            rr.add_cookie(cookie);
        } else {
            tracing::warn!("Session established without an id; no cookie issued");
        }
        Ok(ClauseOutcome::Pass)
    }
}

fn session_cookie(session: &dyn Session, insecure: bool) -> Result<Option<OutCookie>, RouteError> {
    let (Some(id), Some(secret)) = (session.session_id(), session.secret()) else {
        return Ok(None);
    };
    let cookie = OutCookie::new(SESSION_COOKIE, id.as_str(), Some(Arc::new(secret)))?;
    Ok(Some(if insecure { cookie.insecure() } else { cookie }))
}

impl RouterClause for CookieAuth {
    fn route<'b>(&'b self, rr: &mut RouteRequest<'_>) -> Result<ClauseOutcome<'b>, RouteError> {
        let ctx = rr.context_mut();

        // Requests arriving over a stream come with their session bound.
        if ctx.identity().is_authenticated() && !ctx.session().expired() {
            return Ok(ClauseOutcome::Pass);
        }

        if ctx.cookies().get(SESSION_COOKIE).is_none() {
            return self.password_login(rr);
        }

        match ctx.session_from_cookie()? {
            Some(session) => {
                ctx.set_session(session);
                Ok(ClauseOutcome::Pass)
            }
            None => {
                tracing::debug!(request_id = %ctx.request_id(), "Session cookie names no live session");
                Ok(ClauseOutcome::Gate(&self.auth_block))
            }
        }
    }

    fn name(&self) -> &'static str {
        "cookie_auth"
    }

    fn argument(&self) -> String {
        String::new()
    }

    fn route_block(&self) -> Option<&RouteBlock> {
        Some(&self.auth_block)
    }

    fn prototype(&self) -> Box<dyn RouterClause> {
        Box::new(CookieAuth::new(
            RouteBlock::new(),
            Arc::new(super::StaticPasswords::new()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::test_sessions;
    use crate::http::RequestContext;
    use crate::identity::{NamedUser, StaticPasswords};
    use crate::routing::{handler_fn, Handler};
    use crate::session::{RamSessionServer, SessionServer};
    use axum::body::Bytes;
    use axum::http::{header, Request};

    fn named(name: &'static str) -> Arc<dyn Handler> {
        handler_fn(name, |_, _| {})
    }

    fn table() -> RouteBlock {
        let passwords = StaticPasswords::new()
            .with_user("alice", "secret")
            .unwrap()
            .lock("mallory");
        let mut login = RouteBlock::new();
        login.add_location_forward("/", named("login_form"));

        let mut root = RouteBlock::new();
        root.add_location_return("/public", named("public"));
        root.add(CookieAuth::new(login, Arc::new(passwords)).insecure(true));
        root.add_location_forward("/", named("protected"));
        root
    }

    fn context(request: Request<()>, body: &'static str, sessions: &Arc<RamSessionServer>) -> RequestContext {
        let (parts, _) = request.into_parts();
        RequestContext::new(parts, Bytes::from_static(body.as_bytes()), sessions.clone())
    }

    fn cookie_header(session: &dyn Session) -> String {
        let rendered = session_cookie(session, false).unwrap().unwrap().render().unwrap();
        rendered.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_first_visit_routes_to_auth_block() {
        let sessions = test_sessions();
        let root = table();
        let mut ctx = context(Request::builder().uri("/account").body(()).unwrap(), "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);

        let terminal = root.route(&mut rr).unwrap().unwrap();
        assert_eq!(terminal.name(), "login_form");
        assert!(rr.route_result().cookies.is_empty());
        assert!(ctx.auth_error().unwrap().is_no_auth_given());
    }

    #[tokio::test]
    async fn test_public_route_needs_no_auth() {
        let sessions = test_sessions();
        let root = table();
        let mut ctx = context(Request::builder().uri("/public").body(()).unwrap(), "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "public");
    }

    #[tokio::test]
    async fn test_password_login_sets_cookie_and_passes() {
        let sessions = test_sessions();
        let root = table();
        let request = Request::builder()
            .method("POST")
            .uri("/account")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(())
            .unwrap();
        let mut ctx = context(request, "username=alice&password=secret", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);

        let terminal = root.route(&mut rr).unwrap().unwrap();
        assert_eq!(terminal.name(), "protected");
        let result = rr.route_result();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].name(), SESSION_COOKIE);
        assert!(result.cookies[0].is_authenticated());
        assert!(!result.cookies[0].render().unwrap().contains("Secure"));

        assert!(ctx.just_authenticated());
        assert!(ctx.identity().is_authenticated());
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_fullwidth_username_logs_in_as_ascii_user() {
        let sessions = test_sessions();
        let root = table();
        // "ａｌｉｃｅ" in fullwidth letters.
        let request = Request::builder()
            .uri("/account?username=%EF%BD%81%EF%BD%8C%EF%BD%89%EF%BD%83%EF%BD%85&password=secret")
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);

        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "protected");
        assert_eq!(ctx.identity().log_name(), "alice");
    }

    #[tokio::test]
    async fn test_wrong_password_recorded() {
        let sessions = test_sessions();
        let root = table();
        let request = Request::builder()
            .uri("/account?username=alice&password=nope")
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);

        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "login_form");
        assert!(ctx.auth_error().unwrap().is_wrong_user_or_password());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_locked_out_may_not_retry() {
        let sessions = test_sessions();
        let root = table();
        let request = Request::builder()
            .uri("/account?username=mallory&password=x")
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);
        root.route(&mut rr).unwrap();
        assert!(!ctx.auth_error().unwrap().may_try_again());
    }

    #[tokio::test]
    async fn test_valid_cookie_binds_session() {
        let sessions = test_sessions();
        let session = sessions
            .new_session(Identity::new(Arc::new(NamedUser::new("alice", "password"))))
            .unwrap();
        let root = table();
        let request = Request::builder()
            .uri("/account")
            .header(header::COOKIE, cookie_header(session.as_ref()))
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);

        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "protected");
        assert!(rr.route_result().cookies.is_empty());
        assert_eq!(ctx.session().session_id(), session.session_id());
        assert!(!ctx.just_authenticated());
    }

    #[tokio::test]
    async fn test_cookie_for_expired_session_routes_to_auth() {
        let sessions = test_sessions();
        let session = sessions
            .new_session(Identity::new(Arc::new(NamedUser::new("alice", "password"))))
            .unwrap();
        let header_value = cookie_header(session.as_ref());
        session.expire();

        let root = table();
        let request = Request::builder()
            .uri("/account")
            .header(header::COOKIE, header_value)
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        let mut rr = RouteRequest::new(&mut ctx, false);
        let terminal = root.route(&mut rr).unwrap();
        assert_eq!(terminal.unwrap().name(), "login_form");
    }

    #[tokio::test]
    async fn test_forged_cookie_ignored() {
        let sessions = test_sessions();
        let root = table();
        let request = Request::builder()
            .uri("/account")
            .header(header::COOKIE, "session=forged__!sauthed!_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .body(())
            .unwrap();
        let mut ctx = context(request, "", &sessions);
        assert_eq!(ctx.failed_cookies(), &["session".to_string()]);
        let mut rr = RouteRequest::new(&mut ctx, false);
        assert_eq!(root.route(&mut rr).unwrap().unwrap().name(), "login_form");
    }
}
