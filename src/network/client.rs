//! HTTP client for live calls made while recording or passing requests through

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::{JukeboxError, Result};

/// Request headers the client sets itself and never copies from the caller
///
/// `accept-encoding` is withheld so upstreams answer with identity bodies; the
/// client does not decompress, and recordings store text.
const CLIENT_MANAGED_HEADERS: [&str; 6] = [
    "accept-encoding",
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "transfer-encoding",
];

/// Something that can perform a live HTTP call
///
/// [`HttpClient`] is the real implementation; tests substitute their own.
pub trait Transport: Send + Sync {
    /// Send a request and collect the whole response
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ForwardedResponse>>;
}

/// HTTP(S) client for forwarding requests
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new() -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Self {
            client,
            max_response_size: 256 * 1024 * 1024,
        }
    }

    /// Limit the size of collected response bodies
    #[must_use]
    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    /// Forward a request to its destination
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built, the call fails, or the
    /// response body exceeds the size limit
    pub async fn forward_request(&self, request: OutboundRequest) -> Result<ForwardedResponse> {
        let uri = request
            .url
            .parse::<Uri>()
            .map_err(|e| JukeboxError::Transport(format!("Invalid URI '{}': {e}", request.url)))?;

        debug!("Forwarding {} to {}", request.method, uri);

        let method = request.method.parse::<Method>().map_err(|e| {
            JukeboxError::Transport(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut request_builder = Request::builder().method(method).uri(uri);

        for (name, value) in &request.headers {
            if CLIENT_MANAGED_HEADERS
                .iter()
                .any(|managed| managed.eq_ignore_ascii_case(name))
            {
                continue;
            }
            request_builder = request_builder.header(name.as_str(), value.as_str());
        }

        let http_request = request_builder
            .body(Full::new(request.body))
            .map_err(|e| JukeboxError::Transport(format!("Failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            JukeboxError::Transport(format!("Request failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let limit = self.max_response_size;
        let body_bytes = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                JukeboxError::Transport(format!(
                    "Failed to read response body (limit {limit} bytes): {e}"
                ))
            })?
            .to_bytes();

        Ok(ForwardedResponse {
            status,
            headers,
            body: body_bytes.to_vec(),
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpClient {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ForwardedResponse>> {
        Box::pin(self.forward_request(request))
    }
}

/// Request to be forwarded
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

/// Response from forwarded request
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in wire order, repeated names kept
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl ForwardedResponse {
    /// Headers flattened to one value per lowercase name
    ///
    /// Repeated headers are joined with `", "`.
    #[must_use]
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            map.entry(name.to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }
        map
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Canonical reason phrase of the status code
    #[must_use]
    pub fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("")
    }
}
