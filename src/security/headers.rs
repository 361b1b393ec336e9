//! Security holes and the response header policy.

use axum::http::{header, HeaderMap, HeaderValue};

/// A named relaxation of the default-deny header policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityHole {
    /// Let browsers sniff content types (drops `X-Content-Type-Options`).
    AllowBrowserTypeGuessing,
    /// Opens nothing.
    None,
    /// Several holes declared together.
    Many(Vec<SecurityHole>),
}

#[derive(Debug, Default)]
struct Policy {
    allow_browser_type_guessing: bool,
}

impl Policy {
    fn open(&mut self, hole: &SecurityHole) {
        match hole {
            SecurityHole::AllowBrowserTypeGuessing => self.allow_browser_type_guessing = true,
            SecurityHole::None => {}
            SecurityHole::Many(holes) => holes.iter().for_each(|h| self.open(h)),
        }
    }
}

/// Set the protective headers not disabled by `holes`, replacing any
/// value already present.
pub fn apply_security_headers(headers: &mut HeaderMap, holes: &[SecurityHole]) {
    let mut policy = Policy::default();
    holes.iter().for_each(|h| policy.open(h));

    if !policy.allow_browser_type_guessing {
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nosniff_by_default() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&mut headers, &[]);
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    }

    #[test]
    fn test_overrides_handler_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-content-type-options", HeaderValue::from_static("sniff-away"));
        headers.append("x-content-type-options", HeaderValue::from_static("again"));
        apply_security_headers(&mut headers, &[SecurityHole::None]);
        let values: Vec<_> = headers.get_all("x-content-type-options").iter().collect();
        assert_eq!(values, vec!["nosniff"]);
    }

    #[test]
    fn test_hole_removes_header_requirement() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&mut headers, &[SecurityHole::AllowBrowserTypeGuessing]);
        assert!(headers.get("x-content-type-options").is_none());

        let mut headers = HeaderMap::new();
        let nested = SecurityHole::Many(vec![SecurityHole::None, SecurityHole::AllowBrowserTypeGuessing]);
        apply_security_headers(&mut headers, &[nested]);
        assert!(headers.get("x-content-type-options").is_none());
    }
}
