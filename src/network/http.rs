//! HTTP request service for the mock endpoint

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::{Config, LimitsConfig};
use crate::message;
use crate::proxy::{ProxyOrchestrator, ProxyRequest};
use crate::{JukeboxError, Result};

/// Methods advertised in the CORS preflight
const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Serves `POST {mock_path}` by handing the payload to the orchestrator
pub struct HttpHandler {
    orchestrator: Arc<ProxyOrchestrator>,
    mock_path: String,
    max_request_size: usize,
    max_headers: usize,
}

impl HttpHandler {
    /// Create a handler with default limits
    #[must_use]
    pub fn new(orchestrator: Arc<ProxyOrchestrator>, mock_path: impl Into<String>) -> Self {
        let limits = LimitsConfig::default();
        Self {
            orchestrator,
            mock_path: mock_path.into(),
            max_request_size: limits.max_request_size,
            max_headers: limits.max_headers,
        }
    }

    /// Create the handler described by the configuration
    #[must_use]
    pub fn from_config(config: &Config, orchestrator: Arc<ProxyOrchestrator>) -> Self {
        Self::new(orchestrator, config.server.mock_path.clone()).with_limits(&config.limits)
    }

    /// Apply request size and header count limits
    #[must_use]
    pub fn with_limits(mut self, limits: &LimitsConfig) -> Self {
        self.max_request_size = limits.max_request_size;
        self.max_headers = limits.max_headers;
        self
    }

    /// Serve one request; failures become `Error: <message>` responses
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = request.uri().path().to_string();
        debug!("{} {}", request.method(), path);

        if path != self.mock_path {
            return Self::create_response(StatusCode::NOT_FOUND, &format!("Error: no route for {path}"));
        }

        if request.method() == Method::OPTIONS {
            return Self::preflight_response(&request);
        }

        if request.method() != Method::POST {
            return Self::create_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("Error: {} is not supported on {path}", request.method()),
            );
        }

        match self.serve(request).await {
            Ok(response) => Self::into_http(response),
            Err(e) => {
                warn!("[mocking] Mock request failed: {e}");
                Self::error_response(&e)
            }
        }
    }

    async fn serve<B>(&self, request: Request<B>) -> Result<message::Response>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::validate_request(&request, self.max_request_size, self.max_headers)?;
        let body = Self::read_body(request.into_body(), self.max_request_size).await?;
        self.resolve(&body).await
    }

    /// Parse a mock payload and resolve it into the endpoint response
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a valid mock request or the
    /// orchestrator rejects it
    pub async fn resolve(&self, body: &[u8]) -> Result<message::Response> {
        let payload: ProxyRequest = serde_json::from_slice(body)?;
        let output = self.orchestrator.get_response(&payload).await?;
        Ok(output.into_endpoint_response())
    }

    /// Create a plain-text response
    #[must_use]
    pub fn create_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Create an error response
    #[must_use]
    pub fn error_response(error: &JukeboxError) -> Response<Full<Bytes>> {
        let status = match error {
            JukeboxError::Json(_)
            | JukeboxError::InvalidAlbum(_)
            | JukeboxError::InvalidUrl { .. }
            | JukeboxError::InvalidMethod(_) => StatusCode::BAD_REQUEST,
            JukeboxError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::create_response(status, &format!("Error: {error}"))
    }

    /// Permissive CORS preflight answer
    fn preflight_response<B>(request: &Request<B>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.insert(
            hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        let requested = request
            .headers()
            .get(hyper::header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*"));
        headers.insert(hyper::header::ACCESS_CONTROL_ALLOW_HEADERS, requested);

        response
    }

    /// Convert a resolved response into a hyper response
    ///
    /// Headers that are not valid on the wire are dropped with a warning.
    #[must_use]
    pub fn into_http(response: message::Response) -> Response<Full<Bytes>> {
        let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
            warn!("[mocking] Invalid status {} in mock response", response.status);
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut http = Response::new(Full::new(Bytes::from(response.body.unwrap_or_default())));
        *http.status_mut() = status;

        for (name, value) in &response.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    http.headers_mut().append(name, value);
                }
                _ => warn!("[mocking] Dropping invalid header {name:?}"),
            }
        }

        http
    }

    /// Reject requests that declare an oversized body or too many headers
    ///
    /// # Errors
    ///
    /// Returns error if request is invalid or too large
    pub fn validate_request<B>(request: &Request<B>, max_size: usize, max_headers: usize) -> Result<()> {
        if let Some(length) = request
            .headers()
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok())
        {
            if length > max_size {
                return Err(JukeboxError::DataTooLarge {
                    size: length,
                    limit: max_size,
                });
            }
        }

        let header_count = request.headers().len();
        if header_count > max_headers {
            return Err(JukeboxError::Other(format!(
                "Too many headers: {header_count}"
            )));
        }

        Ok(())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns error if body is too large or read fails
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(body, max_size).collect().await.map_err(|e| {
            if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                JukeboxError::DataTooLarge {
                    size: max_size.saturating_add(1),
                    limit: max_size,
                }
            } else {
                JukeboxError::Other(format!("Failed to read body: {e}"))
            }
        })?;

        Ok(collected.to_bytes())
    }
}
