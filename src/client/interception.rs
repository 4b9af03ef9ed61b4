//! Interception boundary and an in-process implementation of it

use std::sync::{Arc, PoisonError, RwLock};

use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::message::{Request, Response};
use crate::network::Transport;
use crate::{JukeboxError, Result};

use super::handler::{pass_through, RouteHandler};
use super::route::Route;

/// What to do with a request no route handler claims
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledRequest {
    /// Send it to its destination silently
    #[default]
    Bypass,
    /// Send it to its destination and log a warning
    Warn,
    /// Fail the request
    Error,
}

/// Options for starting interception; unset fields fall back to the other layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Policy for requests no handler claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unhandled_request: Option<UnhandledRequest>,
    /// Suppress start/stop logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,
}

impl StartOptions {
    /// These options overlaid with `overrides`; fields set in `overrides` win
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        Self {
            on_unhandled_request: overrides.on_unhandled_request.or(self.on_unhandled_request),
            quiet: overrides.quiet.or(self.quiet),
        }
    }

    /// Set the unhandled-request policy
    #[must_use]
    pub fn with_unhandled_request(mut self, policy: UnhandledRequest) -> Self {
        self.on_unhandled_request = Some(policy);
        self
    }

    /// Effective unhandled-request policy
    #[must_use]
    pub fn unhandled_request(&self) -> UnhandledRequest {
        self.on_unhandled_request.unwrap_or_default()
    }
}

/// The mechanism that intercepts outgoing requests
pub trait Interceptor: Send + Sync {
    /// Begin intercepting
    ///
    /// # Errors
    ///
    /// Returns error if interception cannot be started
    fn start(&self, options: &StartOptions) -> Result<()>;

    /// Stop intercepting; requests go to their destinations again
    fn stop(&self);

    /// Install handlers for the current session
    fn use_handlers(&self, handlers: Vec<RouteHandler>);

    /// Remove every installed handler
    fn reset_handlers(&self);
}

#[derive(Default)]
struct Session {
    started: bool,
    options: StartOptions,
    handlers: Vec<Arc<RouteHandler>>,
}

/// Interceptor for Rust callers: requests are routed through [`LocalInterceptor::dispatch`]
pub struct LocalInterceptor {
    transport: Arc<dyn Transport>,
    session: RwLock<Session>,
}

impl LocalInterceptor {
    /// Create a stopped interceptor; unclaimed requests go out through `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            session: RwLock::new(Session::default()),
        }
    }

    /// Whether interception is running
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .started
    }

    /// Number of installed handlers
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    /// Send a request through interception
    ///
    /// The first handler whose route matches the method and URL answers it.
    /// Otherwise the unhandled-request policy applies; while stopped, every
    /// request goes straight to its destination.
    ///
    /// # Errors
    ///
    /// Returns error if the handler or the live call fails, or the policy
    /// rejects an unclaimed request
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        let claim = {
            let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
            session.started.then(|| {
                let handler = session
                    .handlers
                    .iter()
                    .find(|handler| route_claims(handler.route(), &request))
                    .map(Arc::clone);
                (handler, session.options.unhandled_request())
            })
        };

        let Some((handler, policy)) = claim else {
            return pass_through(self.transport.as_ref(), &request).await;
        };

        if let Some(handler) = handler {
            debug!(
                "[mocking] {} {} handled by route {} {}",
                request.method,
                request.url,
                handler.route().method(),
                handler.route().url()
            );
            return handler.handle(request).await;
        }

        match policy {
            UnhandledRequest::Bypass => {}
            UnhandledRequest::Warn => {
                warn!(
                    "[mocking] Captured a request without a matching route: {} {}",
                    request.method, request.url
                );
            }
            UnhandledRequest::Error => {
                return Err(JukeboxError::Other(format!(
                    "Unhandled request: {} {}",
                    request.method, request.url
                )));
            }
        }

        pass_through(self.transport.as_ref(), &request).await
    }

    fn session_mut(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Interceptor for LocalInterceptor {
    fn start(&self, options: &StartOptions) -> Result<()> {
        let mut session = self.session_mut();
        session.started = true;
        session.options = options.clone();
        if !options.quiet.unwrap_or(false) {
            info!("[mocking] Interception started");
        }
        Ok(())
    }

    fn stop(&self) {
        let mut session = self.session_mut();
        if session.started && !session.options.quiet.unwrap_or(false) {
            info!("[mocking] Interception stopped");
        }
        session.started = false;
    }

    fn use_handlers(&self, handlers: Vec<RouteHandler>) {
        let mut session = self.session_mut();
        session.handlers.extend(handlers.into_iter().map(Arc::new));
    }

    fn reset_handlers(&self) {
        self.session_mut().handlers.clear();
    }
}

/// Whether `route` claims `request` by method and URL pattern
///
/// Patterns starting with `/` compare against the request path; others
/// compare against the URL without its query. A trailing `*` matches by prefix.
#[must_use]
pub fn route_claims(route: &Route, request: &Request) -> bool {
    route.method().eq_ignore_ascii_case(&request.method) && url_matches(route.url(), &request.url)
}

fn url_matches(pattern: &str, url: &str) -> bool {
    let Ok(uri) = url.parse::<Uri>() else {
        return false;
    };

    let candidate = if pattern.starts_with('/') {
        uri.path().to_string()
    } else {
        match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}{}", uri.path()),
            _ => uri.path().to_string(),
        }
    };

    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => candidate == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockBackend, MockingState, RouteContext};
    use crate::config::MockingMode;
    use crate::network::{ForwardedResponse, OutboundRequest};
    use crate::proxy::ProxyRequest;
    use futures_util::future::BoxFuture;

    struct Backend;

    impl MockBackend for Backend {
        fn get_response<'a>(
            &'a self,
            _payload: &'a ProxyRequest,
        ) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async {
                let mut response = Response::new(200);
                response.body = Some("mock".to_string());
                Ok(response)
            })
        }
    }

    struct Live;

    impl Transport for Live {
        fn send(&self, _request: OutboundRequest) -> BoxFuture<'_, Result<ForwardedResponse>> {
            Box::pin(async {
                Ok(ForwardedResponse {
                    status: 200,
                    headers: vec![],
                    body: b"live".to_vec(),
                })
            })
        }
    }

    fn interceptor_with(route: Route) -> LocalInterceptor {
        let interceptor = LocalInterceptor::new(Arc::new(Live));
        interceptor.use_handlers(vec![RouteHandler::new(
            Arc::new(route),
            Arc::new(MockingState::new("album", MockingMode::Playback)),
            RouteContext::new(),
            Arc::new(Backend),
            Arc::new(Live),
        )]);
        interceptor
    }

    #[test]
    fn test_url_patterns() {
        assert!(url_matches("/timestamp", "http://localhost:4000/timestamp?tz=utc"));
        assert!(!url_matches("/timestamp", "http://localhost:4000/timestamps"));
        assert!(url_matches(
            "http://localhost:4000/timestamp",
            "http://localhost:4000/timestamp"
        ));
        assert!(!url_matches(
            "http://localhost:4000/timestamp",
            "http://localhost:5000/timestamp"
        ));
        assert!(url_matches("https://api.example.com/*", "https://api.example.com/v1/users"));
        assert!(url_matches("/api/*", "http://h/api/items/3"));
        assert!(!url_matches("/api/*", "http://h/other"));
    }

    #[test]
    fn test_route_claims_by_method() {
        let request = Request::new("post", "http://h/items");
        assert!(route_claims(&Route::post("/items"), &request));
        assert!(!route_claims(&Route::get("/items"), &request));
    }

    #[test]
    fn test_start_options_merge() {
        let global = StartOptions {
            on_unhandled_request: Some(UnhandledRequest::Warn),
            quiet: Some(true),
        };
        let local = StartOptions::default().with_unhandled_request(UnhandledRequest::Error);

        let merged = global.merged(&local);
        assert_eq!(merged.unhandled_request(), UnhandledRequest::Error);
        assert_eq!(merged.quiet, Some(true));
        assert_eq!(StartOptions::default().unhandled_request(), UnhandledRequest::Bypass);
    }

    #[tokio::test]
    async fn test_dispatch_while_stopped_goes_live() {
        let interceptor = interceptor_with(Route::get("/timestamp"));

        let response = interceptor
            .dispatch(Request::new("GET", "http://h/timestamp"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_handler() {
        let interceptor = interceptor_with(Route::get("/timestamp"));
        interceptor.start(&StartOptions::default()).unwrap();

        let response = interceptor
            .dispatch(Request::new("GET", "http://h/timestamp"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("mock"));

        let response = interceptor
            .dispatch(Request::new("GET", "http://h/elsewhere"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn test_unhandled_error_policy() {
        let interceptor = interceptor_with(Route::get("/timestamp"));
        interceptor
            .start(&StartOptions::default().with_unhandled_request(UnhandledRequest::Error))
            .unwrap();

        let result = interceptor
            .dispatch(Request::new("GET", "http://h/elsewhere"))
            .await;
        assert!(matches!(result, Err(JukeboxError::Other(_))));
    }

    #[test]
    fn test_reset_and_stop() {
        let interceptor = interceptor_with(Route::get("/timestamp"));
        interceptor.start(&StartOptions::default()).unwrap();
        assert!(interceptor.is_started());
        assert_eq!(interceptor.handler_count(), 1);

        interceptor.reset_handlers();
        interceptor.stop();
        assert!(!interceptor.is_started());
        assert_eq!(interceptor.handler_count(), 0);
    }
}
