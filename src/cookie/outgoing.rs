//! Outgoing cookies.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{is_loose_value_byte, is_strict_value_byte, CookieError};
use crate::secret::Authenticator;

/// 2038-01-01T00:00:00Z; expiry at or after this overflows 32-bit clients.
const YEAR_2038: u64 = 2_145_916_800;
/// Largest 32-bit Unix time, used for "forever" cookies.
const FOREVER: u64 = 2_147_483_647;
const DELETED_EXPIRES: &str = "Fri, 02-Jan-1970 00:00:01 GMT";

/// The SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    /// Emit no SameSite attribute.
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    Session,
    Until { max_age: Option<Duration>, expires: SystemTime },
    Deleted,
}

/// A cookie to set on the response.
#[derive(Clone)]
pub struct OutCookie {
    name: String,
    value: String,
    authenticator: Option<Arc<dyn Authenticator>>,
    lifetime: Lifetime,
    path: Option<String>,
    domain: Option<String>,
    client_can_read: bool,
    insecure: bool,
    same_site: SameSite,
}

impl OutCookie {
    /// A cookie with a strict RFC 6265 value. With an authenticator the
    /// name and value are signed when rendered.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<Self, CookieError> {
        Self::build(true, name.into(), value.into(), authenticator)
    }

    /// Like [`OutCookie::new`] but permits spaces and commas in the value.
    pub fn nonstandard(
        name: impl Into<String>,
        value: impl Into<String>,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<Self, CookieError> {
        Self::build(false, name.into(), value.into(), authenticator)
    }

    fn build(
        strict: bool,
        name: String,
        value: String,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<Self, CookieError> {
        if name.is_empty() {
            return Err(invalid(&name, "no name given"));
        }
        if !name.bytes().all(super::is_name_byte) {
            return Err(invalid(&name, "the name contains invalid characters"));
        }
        let value_ok = if strict {
            value.bytes().all(is_strict_value_byte)
        } else {
            value.bytes().all(is_loose_value_byte)
        };
        if !value_ok {
            return Err(invalid(&name, "the value contains invalid characters"));
        }

        Ok(Self {
            name,
            value,
            authenticator,
            lifetime: Lifetime::Session,
            path: None,
            domain: None,
            client_can_read: false,
            insecure: false,
            same_site: SameSite::Strict,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticator.is_some()
    }

    /// Expire after `duration`, which must be at least a second and end
    /// before 2038 (use [`OutCookie::forever`] for that).
    pub fn duration(mut self, duration: Duration) -> Result<Self, CookieError> {
        if duration < Duration::from_secs(1) {
            return Err(invalid(&self.name, "duration was set to less than one second"));
        }
        let expires = SystemTime::now() + duration;
        let unix = expires.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        if unix >= YEAR_2038 {
            return Err(invalid(
                &self.name,
                "cookie's duration is too long (use forever() for a deliberately long-lived cookie)",
            ));
        }
        self.lifetime = Lifetime::Until {
            max_age: Some(duration),
            expires,
        };
        Ok(self)
    }

    /// Expire when the browser closes. The default.
    pub fn session(mut self) -> Self {
        self.lifetime = Lifetime::Session;
        self
    }

    /// Expire at the end of 32-bit time.
    pub fn forever(mut self) -> Self {
        self.lifetime = Lifetime::Until {
            max_age: None,
            expires: UNIX_EPOCH + Duration::from_secs(FOREVER),
        };
        self
    }

    /// Turn this into a deletion: empty, unsigned, expired in the past.
    pub fn delete(mut self) -> Self {
        self.lifetime = Lifetime::Deleted;
        self.authenticator = None;
        self.value.clear();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Result<Self, CookieError> {
        let path = path.into();
        if !path.bytes().all(|b| (0x20..0x80).contains(&b) && !matches!(b, b'"' | b';' | b'\\')) {
            return Err(invalid(&self.name, "path is illegal"));
        }
        self.path = Some(path);
        Ok(self)
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Result<Self, CookieError> {
        let domain = domain.into();
        if !is_cookie_domain_name(&domain) {
            return Err(invalid(&self.name, "domain is illegal"));
        }
        self.domain = Some(domain);
        Ok(self)
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Visible to scripts. Such a cookie is never signed.
    pub fn client_can_read(mut self) -> Self {
        self.client_can_read = true;
        self.authenticator = None;
        self
    }

    /// Allow sending over plain HTTP.
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    /// The `Set-Cookie` header value.
    pub fn render(&self) -> Result<String, CookieError> {
        let value = match &self.authenticator {
            Some(auth) => {
                let signed = auth.authenticate(&[self.name.as_bytes(), self.value.as_bytes()])?;
                String::from_utf8_lossy(&signed).into_owned()
            }
            None => quote_if_needed(&self.value),
        };

        let mut chunks = vec![format!("{}={}", self.name, value)];
        match self.lifetime {
            Lifetime::Session => {}
            Lifetime::Until { max_age, expires } => {
                if let Some(max_age) = max_age {
                    chunks.push(format!("Max-Age={}", max_age.as_secs()));
                }
                chunks.push(format!("Expires={}", httpdate::fmt_http_date(expires)));
            }
            Lifetime::Deleted => chunks.push(format!("Expires={}", DELETED_EXPIRES)),
        }
        chunks.push(format!("Path={}", self.path.as_deref().unwrap_or("/")));
        if let Some(domain) = &self.domain {
            chunks.push(format!("Domain={}", domain));
        }
        if !self.client_can_read {
            chunks.push("HttpOnly".to_string());
        }
        if !self.insecure {
            chunks.push("Secure".to_string());
        }
        match self.same_site {
            SameSite::Strict => chunks.push("SameSite=Strict".to_string()),
            SameSite::Lax => chunks.push("SameSite=Lax".to_string()),
            SameSite::Unset => {}
        }
        Ok(chunks.join("; "))
    }
}

impl fmt::Debug for OutCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutCookie")
            .field("name", &self.name)
            .field("authenticated", &self.is_authenticated())
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

fn invalid(name: &str, reason: &'static str) -> CookieError {
    CookieError::Invalid {
        name: name.to_string(),
        reason,
    }
}

fn quote_if_needed(value: &str) -> String {
    let edge = |c: Option<char>| matches!(c, Some(' ') | Some(','));
    if edge(value.chars().next()) || edge(value.chars().last()) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Hostname check in the manner of RFC 1123, allowing one leading dot.
fn is_cookie_domain_name(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    let domain = domain.strip_prefix('.').unwrap_or(domain);

    let mut last = b'.';
    let mut saw_letter = false;
    let mut part_len = 0;
    for c in domain.bytes() {
        match c {
            b'a'..=b'z' | b'A'..=b'Z' => {
                saw_letter = true;
                part_len += 1;
            }
            b'0'..=b'9' => part_len += 1,
            b'-' => {
                if last == b'.' {
                    return false;
                }
                part_len += 1;
            }
            b'.' => {
                if last == b'.' || last == b'-' || part_len == 0 || part_len > 63 {
                    return false;
                }
                part_len = 0;
            }
            _ => return false,
        }
        last = c;
    }
    last != b'-' && part_len <= 63 && saw_letter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{AuthenticationUnwrapper, Secret};

    fn secret() -> Arc<Secret> {
        Arc::new(Secret::new(vec![9u8; 32]))
    }

    #[test]
    fn test_defaults_are_restrictive() {
        let rendered = OutCookie::new("theme", "dark", None).unwrap().render().unwrap();
        assert_eq!(rendered, "theme=dark; Path=/; HttpOnly; Secure; SameSite=Strict");
    }

    #[test]
    fn test_signed_render_verifies() {
        let s = secret();
        let cookie = OutCookie::new("theme", "dark", Some(s.clone())).unwrap();
        let rendered = cookie.render().unwrap();
        let value = rendered.split(';').next().unwrap().strip_prefix("theme=").unwrap();
        assert!(value.starts_with("dark__!sauthed!_"));
        assert_eq!(
            s.unwrap_authentication(&[b"theme", value.as_bytes()]).unwrap(),
            b"dark"
        );
    }

    #[test]
    fn test_relaxations() {
        let rendered = OutCookie::new("a", "b", Some(secret()))
            .unwrap()
            .client_can_read()
            .insecure()
            .same_site(SameSite::Lax)
            .path("/app")
            .unwrap()
            .domain("example.com")
            .unwrap()
            .render()
            .unwrap();
        assert_eq!(rendered, "a=b; Path=/app; Domain=example.com; SameSite=Lax");

        let rendered = OutCookie::new("a", "b", None)
            .unwrap()
            .same_site(SameSite::Unset)
            .render()
            .unwrap();
        assert!(!rendered.contains("SameSite"));
    }

    #[test]
    fn test_duration_and_forever() {
        let rendered = OutCookie::new("a", "b", None)
            .unwrap()
            .duration(Duration::from_secs(3600))
            .unwrap()
            .render()
            .unwrap();
        assert!(rendered.contains("Max-Age=3600"));
        assert!(rendered.contains("Expires="));

        let rendered = OutCookie::new("a", "b", None).unwrap().forever().render().unwrap();
        assert!(rendered.contains("Expires=Tue, 19 Jan 2038 03:14:07 GMT"));
        assert!(!rendered.contains("Max-Age"));
    }

    #[test]
    fn test_duration_limits() {
        let short = OutCookie::new("a", "b", None).unwrap().duration(Duration::from_millis(500));
        assert!(matches!(short, Err(CookieError::Invalid { .. })));
        let long = OutCookie::new("a", "b", None)
            .unwrap()
            .duration(Duration::from_secs(200 * 365 * 24 * 3600));
        assert!(long.is_err());
    }

    #[test]
    fn test_delete() {
        let rendered = OutCookie::new("session", "abc", Some(secret()))
            .unwrap()
            .delete()
            .render()
            .unwrap();
        assert!(rendered.starts_with("session=; Expires=Fri, 02-Jan-1970 00:00:01 GMT"));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(OutCookie::new("", "v", None).is_err());
        assert!(OutCookie::new("bad name", "v", None).is_err());
        assert!(OutCookie::new("n", "a;b", None).is_err());
        assert!(OutCookie::new("n", "a b", None).is_err());
        assert!(OutCookie::nonstandard("n", "a b,c", None).is_ok());
        assert!(OutCookie::new("n", "v", None).unwrap().path("/a;b").is_err());
        assert!(OutCookie::new("n", "v", None).unwrap().domain("-bad.com").is_err());
        assert!(OutCookie::new("n", "v", None).unwrap().domain("a..b").is_err());
        assert!(OutCookie::new("n", "v", None).unwrap().domain("123").is_err());
        assert!(OutCookie::new("n", "v", None).unwrap().domain(".example.org").is_ok());
    }

    #[test]
    fn test_nonstandard_value_quoted_at_edges() {
        let rendered = OutCookie::nonstandard("n", " padded", None).unwrap().render().unwrap();
        assert!(rendered.starts_with("n=\" padded\";"));
    }
}
