//! Recording: perform the live call, save it, return it

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RedactionConfig};
use crate::message::Request;
use crate::network::{ForwardedResponse, OutboundRequest, Transport};
use crate::proxy::{GetResponseOutput, Source};
use crate::storage::{RecordedRequest, RecordedResponse, Recording, RecordingStore, WriteOutcome};

use super::DEFAULT_TIMEOUT;

/// Resolves mock requests by calling the real destination and saving the exchange
pub struct RecordResolver {
    store: Arc<RecordingStore>,
    transport: Arc<dyn Transport>,
    redaction: RedactionConfig,
    timeout: Duration,
}

impl RecordResolver {
    /// Create a record resolver with default redaction and timeout
    #[must_use]
    pub fn new(store: Arc<RecordingStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            redaction: RedactionConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create the resolver described by the configuration
    #[must_use]
    pub fn from_config(
        config: &Config,
        store: Arc<RecordingStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(store, transport)
            .with_redaction(config.redaction.clone())
            .with_timeout(Duration::from_millis(config.upstream.timeout_ms))
    }

    /// Replace the header denylists
    #[must_use]
    pub fn with_redaction(mut self, redaction: RedactionConfig) -> Self {
        self.redaction = redaction;
        self
    }

    /// Bound the live call
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch `url` live, persist the exchange at `path`, and return the live response
    ///
    /// Never fails: a failed live call yields a 500-shaped output, and persistence
    /// failures are logged without affecting the returned response.
    pub async fn resolve(&self, url: &str, request: &Request, path: &Path) -> GetResponseOutput {
        let request_body = request.body_text();

        let outbound = OutboundRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body: request_body
                .clone()
                .map_or_else(Bytes::new, Bytes::from),
        };

        let response = match tokio::time::timeout(self.timeout, self.transport.send(outbound)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    "[mocking] Error fetching {url} with {} (headers: {:?}, body: {:?}): {e}",
                    request.method, request.headers, request_body
                );
                return fetch_error_output(url);
            }
            Err(_) => {
                error!(
                    "[mocking] Error fetching {url} with {} (headers: {:?}, body: {:?}): timed out after {:?}",
                    request.method, request.headers, request_body, self.timeout
                );
                return fetch_error_output(url);
            }
        };

        info!(
            "[mocking] Proxy request for {} {url} returned status {}",
            request.method, response.status
        );

        let response_headers = response.header_map();
        let response_body = normalize_response_body(url, &response, &response_headers);

        let mut recording = Recording {
            request: RecordedRequest {
                body: normalize_request_body(request, request_body),
                headers: request.headers.clone(),
                method: request.method.clone(),
                url: url.to_string(),
            },
            response: RecordedResponse {
                body: Some(response_body.clone()),
                headers: response_headers.clone(),
                status: response.status,
                status_text: response.status_text().to_string(),
                url: url.to_string(),
            },
        };
        recording.redact(
            &self.redaction.request_denylist(),
            &self.redaction.response_headers,
        );

        match self.store.write(path, &recording).await {
            Ok(WriteOutcome::Written) => info!("[mocking] Saved recording {}", path.display()),
            Ok(WriteOutcome::Skipped) => debug!("[mocking] Not saving {}", path.display()),
            Err(e) => error!("[mocking] Error saving {}: {e}", path.display()),
        }

        GetResponseOutput {
            status: response.status,
            headers: response_headers,
            body: Some(response_body),
            source: Source::Live(url.to_string()),
        }
    }
}

/// The synthetic response served when the live call fails
#[must_use]
pub fn fetch_error_output(url: &str) -> GetResponseOutput {
    GetResponseOutput {
        status: 500,
        headers: BTreeMap::new(),
        body: Some(format!("Error fetching {url}")),
        source: Source::FetchError,
    }
}

/// JSON responses are pretty-printed so recordings diff line by line
fn normalize_response_body(
    url: &str,
    response: &ForwardedResponse,
    headers: &BTreeMap<String, String>,
) -> String {
    let text = response.text();
    let is_json = headers
        .get("content-type")
        .is_some_and(|content_type| is_json_content_type(content_type));

    if !is_json || text.is_empty() {
        return text;
    }

    match pretty_json(&text) {
        Some(pretty) => pretty,
        None => {
            warn!("[mocking] Error parsing JSON from {url}; saving the raw body");
            text
        }
    }
}

/// JSON request bodies are pretty-printed for storage only
fn normalize_request_body(request: &Request, body: Option<String>) -> Option<String> {
    let body = body.filter(|body| !body.is_empty())?;

    let is_json = request
        .header("content-type")
        .is_some_and(|content_type| content_type.trim_start().starts_with("application/json"));
    if !is_json {
        return Some(body);
    }

    Some(pretty_json(&body).unwrap_or(body))
}

/// `application/json` or any `+json` type, parameters ignored
fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Two-space indented JSON, or `None` if `text` is not JSON
fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    serde_json::to_string_pretty(&value).ok()
}
