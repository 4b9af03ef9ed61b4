//! Request and response shapes shared by the client pipeline and the proxy

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An intercepted request, as carried to the proxy endpoint
///
/// Header names are stored lowercase when set through [`Request::with_header`];
/// lookups through [`Request::header`] are case-insensitive either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method (e.g. "GET")
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body; either a string or structured JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Request {
    /// Create a request without headers or body
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a header (name is lowercased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a header value, ignoring name case
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Whether a header is present, ignoring name case
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Body as text: strings pass through, structured bodies become compact JSON
    ///
    /// A missing or `null` body has no text.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None | Some(Value::Null) => None,
            Some(value) => Some(value_text(value)),
        }
    }
}

/// A response handed back to the intercepted caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers, one value per name
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body; `None` means no body segment at all
    #[serde(default)]
    pub body: Option<String>,
}

impl Response {
    /// Create a response with no headers and no body
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Body text, empty when absent
    #[must_use]
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// Look up a header value, ignoring name case
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Strings as-is, everything else as compact JSON
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers.get(name).map(String::as_str).or_else(|| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut request = Request::new("GET", "http://localhost/a");
        request
            .headers
            .insert("Content-Type".to_string(), "text/plain".to_string());

        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert!(request.has_header("CONTENT-TYPE"));
        assert!(!request.has_header("accept"));
    }

    #[test]
    fn test_body_text() {
        let request = Request::new("POST", "http://localhost/a");
        assert_eq!(request.body_text(), None);

        let request = request.with_body("raw text");
        assert_eq!(request.body_text().as_deref(), Some("raw text"));

        let request = Request::new("POST", "http://localhost/a").with_body(json!({"a": 1}));
        assert_eq!(request.body_text().as_deref(), Some(r#"{"a":1}"#));

        let request = Request::new("POST", "http://localhost/a").with_body(Value::Null);
        assert_eq!(request.body_text(), None);
    }

    #[test]
    fn test_request_wire_shape_ignores_extra_fields() {
        let request: Request = serde_json::from_value(json!({
            "method": "GET",
            "url": "http://localhost:4000/timestamp",
            "headers": {"accept": "*/*"},
            "credentials": "same-origin",
            "keepalive": false
        }))
        .unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.header("accept"), Some("*/*"));
        assert!(request.body.is_none());
    }
}
