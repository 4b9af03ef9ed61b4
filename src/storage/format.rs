//! Recording document format
//!
//! One YAML document per recording. Field order is alphabetical and header maps are
//! sorted, so re-recording an unchanged exchange produces an identical file. Multi-line
//! bodies (pretty-printed JSON, mostly) are emitted as literal blocks and diff line by line.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// File extension of recording documents
pub const RECORDING_EXTENSION: &str = "yaml";

/// A persisted request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// The request as it was sent upstream (redacted)
    pub request: RecordedRequest,
    /// The response as it was received (redacted)
    pub response: RecordedResponse,
}

/// Request half of a [`Recording`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// Request body text
    #[serde(default, deserialize_with = "lenient_text")]
    pub body: Option<String>,
    /// Request headers
    #[serde(default, deserialize_with = "lenient_headers")]
    pub headers: BTreeMap<String, String>,
    /// HTTP method
    pub method: String,
    /// Request URL
    pub url: String,
}

/// Response half of a [`Recording`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    /// Response body text
    #[serde(default, deserialize_with = "lenient_text")]
    pub body: Option<String>,
    /// Response headers
    #[serde(default, deserialize_with = "lenient_headers")]
    pub headers: BTreeMap<String, String>,
    /// HTTP status code
    pub status: u16,
    /// Reason phrase
    #[serde(rename = "statusText", default)]
    pub status_text: String,
    /// URL the response came from
    #[serde(default)]
    pub url: String,
}

impl Recording {
    /// Render as a YAML document
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a valid recording
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Drop denylisted headers, comparing names case-insensitively
    pub fn redact(&mut self, request_denylist: &[String], response_denylist: &[String]) {
        strip_headers(&mut self.request.headers, request_denylist);
        strip_headers(&mut self.response.headers, response_denylist);
    }
}

fn strip_headers(headers: &mut BTreeMap<String, String>, denylist: &[String]) {
    headers.retain(|name, _| !denylist.iter().any(|denied| denied.eq_ignore_ascii_case(name)));
}

// Hand-written fixtures often leave numeric bodies and header values unquoted.
fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(value) => scalar_text(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom("body must be a scalar")),
    }
}

fn lenient_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            scalar_text(&value)
                .map(|text| (name.clone(), text))
                .ok_or_else(|| D::Error::custom(format!("header '{name}' must be a scalar")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> Recording {
        Recording {
            request: RecordedRequest {
                body: None,
                headers: BTreeMap::from([
                    ("accept".to_string(), "*/*".to_string()),
                    ("authorization".to_string(), "Bearer secret".to_string()),
                    ("Cookie".to_string(), "session=1".to_string()),
                ]),
                method: "GET".to_string(),
                url: "http://localhost:4000/timestamp".to_string(),
            },
            response: RecordedResponse {
                body: Some("1608052800000".to_string()),
                headers: BTreeMap::from([("content-type".to_string(), "text/html".to_string())]),
                status: 200,
                status_text: "OK".to_string(),
                url: "http://localhost:4000/timestamp".to_string(),
            },
        }
    }

    #[test]
    fn test_yaml_keys_sorted() {
        let yaml = recording().to_yaml().unwrap();

        let request_at = yaml.find("request:").unwrap();
        let response_at = yaml.find("response:").unwrap();
        assert!(request_at < response_at);

        let status_at = yaml.find("status:").unwrap();
        let status_text_at = yaml.find("statusText:").unwrap();
        let url_at = yaml.rfind("url:").unwrap();
        assert!(status_at < status_text_at && status_text_at < url_at);
    }

    #[test]
    fn test_numeric_looking_body_stays_text() {
        let yaml = recording().to_yaml().unwrap();
        let parsed = Recording::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.response.body.as_deref(), Some("1608052800000"));
        assert_eq!(parsed, recording());
    }

    #[test]
    fn test_multiline_body_is_not_escaped() {
        let mut rec = recording();
        rec.response.body = Some("{\n  \"a\": 1,\n  \"b\": [\n    2\n  ]\n}".to_string());

        let yaml = rec.to_yaml().unwrap();
        assert!(!yaml.contains("\\n"), "multi-line body must stay multi-line:\n{yaml}");
        assert!(yaml.contains("\"a\": 1,\n"));
        assert_eq!(Recording::from_yaml(&yaml).unwrap(), rec);
    }

    #[test]
    fn test_hand_written_fixture() {
        let yaml = r"
request:
  body: null
  headers: {}
  method: GET
  url: http://localhost:4000/timestamp
response:
  body: 1608052800000
  headers:
    content-length: 13
    content-type: text/html
  status: 200
";
        let parsed = Recording::from_yaml(yaml).unwrap();
        assert_eq!(parsed.response.body.as_deref(), Some("1608052800000"));
        assert_eq!(parsed.response.headers["content-length"], "13");
        assert_eq!(parsed.response.status_text, "");
    }

    #[test]
    fn test_redact_ignores_case() {
        let mut rec = recording();
        rec.redact(
            &["authorization".to_string(), "cookie".to_string()],
            &[],
        );

        assert_eq!(rec.request.headers.len(), 1);
        assert!(rec.request.headers.contains_key("accept"));
        assert_eq!(rec.response.headers.len(), 1);
    }
}
