//! Proxy orchestration: pick a resolver for each mock request

mod orchestrator;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use orchestrator::ProxyOrchestrator;

use crate::config::MockingMode;
use crate::matching::MatchCriteria;
use crate::message::{Request, Response};

/// Diagnostic header naming where a mock came from
pub const SOURCE_HEADER: &str = "x-mocking-source";

/// Headers the endpoint's HTTP stack manages itself
pub const TRANSPORT_HEADERS: [&str; 3] = ["content-encoding", "content-length", "transfer-encoding"];

/// Body of a request to the mock endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// Album to read from or record into
    pub album: String,
    /// Criteria of the route that intercepted the request
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_criteria: Option<MatchCriteria>,
    /// Mode of the client session
    pub mocking_mode: MockingMode,
    /// The intercepted request
    pub request: Request,
}

/// Where a resolved response came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Played back from this recording
    Recording(PathBuf),
    /// Fetched live from this URL
    Live(String),
    /// No recording existed
    NoneFound,
    /// The live call failed
    FetchError,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording(path) => write!(f, "{}", path.display()),
            Self::Live(url) => f.write_str(url),
            Self::NoneFound => f.write_str("<none found>"),
            Self::FetchError => f.write_str("<error fetching url>"),
        }
    }
}

/// A resolved mock response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponseOutput {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Response body
    pub body: Option<String>,
    /// Diagnostics only; never used for matching
    pub source: Source,
}

impl GetResponseOutput {
    /// Shape the output for the wire: drop transport-managed headers, add the
    /// source header and a permissive CORS header
    #[must_use]
    pub fn into_endpoint_response(self) -> Response {
        let mut headers = self.headers;
        headers.retain(|name, _| {
            !TRANSPORT_HEADERS
                .iter()
                .any(|managed| managed.eq_ignore_ascii_case(name))
        });
        headers.insert(SOURCE_HEADER.to_string(), self.source.to_string());
        headers.insert("access-control-allow-origin".to_string(), "*".to_string());

        Response {
            status: self.status,
            headers,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_rendering() {
        assert_eq!(Source::NoneFound.to_string(), "<none found>");
        assert_eq!(Source::FetchError.to_string(), "<error fetching url>");
        assert_eq!(
            Source::Live("http://h/x".to_string()).to_string(),
            "http://h/x"
        );
        assert_eq!(
            Source::Recording(PathBuf::from("r/a/h/x/get/k.yaml")).to_string(),
            "r/a/h/x/get/k.yaml"
        );
    }

    #[test]
    fn test_endpoint_response_headers() {
        let output = GetResponseOutput {
            status: 200,
            headers: BTreeMap::from([
                ("Content-Length".to_string(), "13".to_string()),
                ("content-encoding".to_string(), "gzip".to_string()),
                ("transfer-encoding".to_string(), "chunked".to_string()),
                ("content-type".to_string(), "text/html".to_string()),
            ]),
            body: Some("1608052800000".to_string()),
            source: Source::Live("http://localhost:4000/timestamp".to_string()),
        };

        let response = output.into_endpoint_response();
        assert_eq!(
            response.headers,
            BTreeMap::from([
                ("access-control-allow-origin".to_string(), "*".to_string()),
                ("content-type".to_string(), "text/html".to_string()),
                (
                    SOURCE_HEADER.to_string(),
                    "http://localhost:4000/timestamp".to_string()
                ),
            ])
        );
        assert_eq!(response.body.as_deref(), Some("1608052800000"));
    }

    #[test]
    fn test_proxy_request_wire_shape() {
        let payload: ProxyRequest = serde_json::from_value(json!({
            "album": "clock",
            "mockingMode": "playback",
            "request": {
                "method": "GET",
                "url": "http://localhost:4000/timestamp",
                "headers": {},
                "bodyUsed": false,
                "mode": "cors"
            }
        }))
        .unwrap();

        assert_eq!(payload.album, "clock");
        assert_eq!(payload.mocking_mode, MockingMode::Playback);
        assert!(payload.match_criteria.is_none());

        let invalid = serde_json::from_value::<ProxyRequest>(json!({
            "album": "clock",
            "mockingMode": "replay",
            "request": {"method": "GET", "url": "http://h/"}
        }));
        assert!(invalid.is_err());
    }
}
