//! The flattened outcome of routing.

use std::collections::HashMap;

use axum::http::HeaderMap;

use super::request::HeaderOp;
use crate::cookie::OutCookie;
use crate::security::SecurityHole;

/// Side effects and path split from every frame on the winning path.
#[derive(Debug, Clone, Default)]
pub struct RouteResult {
    /// Later frames win per key.
    pub parameters: HashMap<String, String>,
    /// In the order they were recorded.
    pub headers: Vec<HeaderOp>,
    /// One per name, last write wins.
    pub cookies: Vec<OutCookie>,
    pub holes: Vec<SecurityHole>,
    pub preceding_path: String,
    pub remaining_path: String,
}

impl RouteResult {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Replay the header writes onto `headers`.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        for op in &self.headers {
            match op {
                HeaderOp::Add(name, value) => {
                    headers.append(name.clone(), value.clone());
                }
                HeaderOp::Set(name, value) => {
                    headers.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_add_and_set_semantics() {
        let name = HeaderName::from_static("x-tag");
        let result = RouteResult {
            headers: vec![
                HeaderOp::Add(name.clone(), HeaderValue::from_static("a")),
                HeaderOp::Add(name.clone(), HeaderValue::from_static("b")),
                HeaderOp::Set(HeaderName::from_static("x-one"), HeaderValue::from_static("1")),
                HeaderOp::Set(HeaderName::from_static("x-one"), HeaderValue::from_static("2")),
            ],
            ..RouteResult::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-one", HeaderValue::from_static("handler"));
        result.apply_headers(&mut headers);

        let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(headers.get_all("x-one").iter().count(), 1);
        assert_eq!(headers.get("x-one").unwrap(), "2");
    }
}
