//! Where route handlers obtain mock responses

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::message::Response;
use crate::network::{OutboundRequest, Transport};
use crate::proxy::{ProxyOrchestrator, ProxyRequest, TRANSPORT_HEADERS};
use crate::Result;

/// Resolves a mock request into the response the endpoint would send
pub trait MockBackend: Send + Sync {
    /// Resolve one mock request
    fn get_response<'a>(&'a self, payload: &'a ProxyRequest) -> BoxFuture<'a, Result<Response>>;
}

/// Backend that POSTs mock requests to a running endpoint
pub struct EndpointBackend {
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl EndpointBackend {
    /// Backend for the endpoint at `endpoint`, e.g. `http://127.0.0.1:4001/mock`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
        }
    }

    /// Endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, payload: &ProxyRequest) -> Result<Response> {
        let body = serde_json::to_vec(payload)?;
        debug!(
            "[mocking] POST {} for {} {}",
            self.endpoint, payload.request.method, payload.request.url
        );

        let forwarded = self
            .transport
            .send(OutboundRequest {
                method: "POST".to_string(),
                url: self.endpoint.clone(),
                headers: vec![
                    ("content-type".to_string(), "application/json".to_string()),
                    ("cache-control".to_string(), "no-cache".to_string()),
                ],
                body: Bytes::from(body),
            })
            .await?;

        // The endpoint's own framing headers describe its body, not the one hooks produce
        let mut headers = forwarded.header_map();
        headers.retain(|name, _| !TRANSPORT_HEADERS.contains(&name.as_str()));

        Ok(Response {
            status: forwarded.status,
            headers,
            body: Some(forwarded.text()),
        })
    }
}

impl MockBackend for EndpointBackend {
    fn get_response<'a>(&'a self, payload: &'a ProxyRequest) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.post(payload))
    }
}

/// Backend that resolves mock requests in-process
pub struct LocalBackend {
    orchestrator: Arc<ProxyOrchestrator>,
}

impl LocalBackend {
    /// Backend over an orchestrator
    #[must_use]
    pub fn new(orchestrator: Arc<ProxyOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl MockBackend for LocalBackend {
    fn get_response<'a>(&'a self, payload: &'a ProxyRequest) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let output = self.orchestrator.get_response(payload).await?;
            Ok(output.into_endpoint_response())
        })
    }
}
