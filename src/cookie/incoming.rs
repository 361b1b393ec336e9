//! Incoming cookies.

use std::collections::HashMap;

use super::{is_loose_value_byte, is_name_byte};
use crate::secret::{looks_signed, AuthenticationUnwrappers, SIGNED_TRAILER_LEN};
use crate::session::SESSION_COOKIE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InCookie {
    name: String,
    value: String,
    authenticated: bool,
}

impl InCookie {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }
}

/// The cookies of one request.
#[derive(Debug, Clone, Default)]
pub struct InCookies {
    cookies: HashMap<String, InCookie>,
}

impl InCookies {
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// An authenticated cookie, or none.
    pub fn get(&self, name: &str) -> Option<&InCookie> {
        self.cookies.get(name).filter(|c| c.authenticated)
    }

    /// Any cookie by that name, authenticated or not.
    pub fn get_possibly_unauthenticated(&self, name: &str) -> Option<&InCookie> {
        self.cookies.get(name)
    }

    /// First cookie wins, except that an authenticated cookie replaces an
    /// unauthenticated one.
    fn add(&mut self, cookie: InCookie) {
        match self.cookies.get(&cookie.name) {
            Some(existing) if existing.authenticated || !cookie.authenticated => {}
            _ => {
                self.cookies.insert(cookie.name.clone(), cookie);
            }
        }
    }
}

/// Parse `Cookie` header lines.
///
/// The session cookie is verified against the session it names, then
/// every other signed cookie is verified against that session. Returns
/// the cookies plus the names of signed cookies that failed verification,
/// which the caller should delete.
pub fn parse_cookies<'a, U>(
    lines: impl IntoIterator<Item = &'a str>,
    unwrappers: &U,
) -> (InCookies, Vec<String>)
where
    U: AuthenticationUnwrappers + ?Sized,
{
    let mut result = InCookies::default();
    let mut failed = Vec::new();
    let mut signed: Vec<(String, String)> = Vec::new();
    let mut session: Option<String> = None;

    for line in lines {
        for part in line.trim().split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, mut value) = part.split_once('=').unwrap_or((part, ""));
            if !name.bytes().all(is_name_byte) {
                continue;
            }
            if value.len() > 1 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            if !value.bytes().all(is_loose_value_byte) {
                continue;
            }

            if looks_signed(value.as_bytes()) {
                if name == SESSION_COOKIE {
                    session.get_or_insert_with(|| value.to_string());
                } else {
                    signed.push((name.to_string(), value.to_string()));
                }
            } else {
                result.add(InCookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    authenticated: false,
                });
            }
        }
    }

    let Some(session_value) = session else {
        return (result, failed);
    };

    let session_id = &session_value[..session_value.len() - SIGNED_TRAILER_LEN];
    let verified = unwrappers
        .authentication_unwrapper(session_id)
        .and_then(|unwrapper| {
            unwrapper
                .unwrap_authentication(&[SESSION_COOKIE.as_bytes(), session_value.as_bytes()])
                .ok()
                .map(|_| unwrapper)
        });

    match verified {
        None => {
            failed.extend(signed.into_iter().map(|(name, _)| name));
            failed.push(SESSION_COOKIE.to_string());
        }
        Some(unwrapper) => {
            result.add(InCookie {
                name: SESSION_COOKIE.to_string(),
                value: session_id.to_string(),
                authenticated: true,
            });
            for (name, value) in signed {
                match unwrapper.unwrap_authentication(&[name.as_bytes(), value.as_bytes()]) {
                    Ok(raw) => result.add(InCookie {
                        name,
                        value: String::from_utf8_lossy(&raw).into_owned(),
                        authenticated: true,
                    }),
                    Err(_) => failed.push(name),
                }
            }
        }
    }

    (result, failed)
}
