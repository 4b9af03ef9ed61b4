//! Per-route request handling: match, resolve through the backend, transform

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::matching::{self, MatchCriteria, MatchOutcome};
use crate::message::{Request, Response};
use crate::network::{OutboundRequest, Transport};
use crate::proxy::ProxyRequest;
use crate::{JukeboxError, Result};

use super::backend::MockBackend;
use super::route::{BodyHook, Route, RouteContext};
use super::MockingState;

/// Handles the requests intercepted for one route during one session
///
/// Built fresh on every transition into playback or recording, so it always
/// carries that session's state and context.
pub struct RouteHandler {
    route: Arc<Route>,
    state: Arc<MockingState>,
    context: RouteContext,
    backend: Arc<dyn MockBackend>,
    transport: Arc<dyn Transport>,
}

impl RouteHandler {
    /// Create a handler for `route` within a session
    #[must_use]
    pub fn new(
        route: Arc<Route>,
        state: Arc<MockingState>,
        context: RouteContext,
        backend: Arc<dyn MockBackend>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            route,
            state,
            context,
            backend,
            transport,
        }
    }

    /// The route this handler serves
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The session snapshot this handler was built with
    #[must_use]
    pub fn state(&self) -> &MockingState {
        &self.state
    }

    /// Context shared with the route's hooks
    #[must_use]
    pub fn context(&self) -> &RouteContext {
        &self.context
    }

    /// Answer an intercepted request
    ///
    /// Requests the route's criteria reject are sent to their real
    /// destination unchanged, without hooks.
    ///
    /// # Errors
    ///
    /// Returns error if the session has no album, the backend fails, or a
    /// pass-through request fails
    pub async fn handle(&self, request: Request) -> Result<Response> {
        if !self.state.mode.is_enabled() {
            return pass_through(self.transport.as_ref(), &request).await;
        }

        let match_criteria = match matching::evaluate(self.route.match_criteria(), &request) {
            MatchOutcome::Rejected => {
                debug!(
                    "[mocking] {} {} does not satisfy the route criteria; passing through",
                    request.method, request.url
                );
                return pass_through(self.transport.as_ref(), &request).await;
            }
            MatchOutcome::Unconstrained => self.route.match_criteria().cloned(),
            MatchOutcome::Matched(entry) => Some(MatchCriteria::One(entry.clone())),
        };

        let album = self.state.album.clone().ok_or_else(|| {
            JukeboxError::Config("Mocking session has no album".to_string())
        })?;

        let hooks = self.route.hooks();
        let request = match &hooks.request {
            Some(hook) => hook(request, &self.context),
            None => request,
        };

        let payload = ProxyRequest {
            album,
            match_criteria,
            mocking_mode: self.state.mode,
            request,
        };
        let mock = self.backend.get_response(&payload).await?;
        let request = &payload.request;

        let status = match &hooks.status {
            Some(hook) => hook(mock.status, request, &mock, &self.context),
            None => mock.status,
        };

        let body = match &hooks.body {
            Some(BodyHook::Json(hook)) => match serde_json::from_str::<Value>(mock.text()) {
                Ok(parsed) => Some(serde_json::to_string(&hook(
                    parsed,
                    request,
                    &mock,
                    &self.context,
                ))?),
                Err(e) => {
                    warn!(
                        "[mocking] Body of {} {} is not JSON ({e}); skipping the JSON body hook",
                        request.method, request.url
                    );
                    mock.body.clone()
                }
            },
            Some(BodyHook::Text(hook)) => Some(hook(
                mock.text().to_string(),
                request,
                &mock,
                &self.context,
            )),
            None => mock.body.clone(),
        };

        let headers = match &hooks.headers {
            Some(hook) => hook(mock.headers.clone(), request, &mock, &self.context),
            None => mock.headers.clone(),
        };

        Ok(Response {
            status,
            headers,
            body: body.filter(|body| !body.is_empty()),
        })
    }
}

/// Send `request` to its real destination and return what came back
///
/// # Errors
///
/// Returns error if the live call fails
pub(crate) async fn pass_through(transport: &dyn Transport, request: &Request) -> Result<Response> {
    let outbound = OutboundRequest {
        method: request.method.clone(),
        url: request.url.clone(),
        headers: request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        body: request.body_text().map_or_else(Bytes::new, Bytes::from),
    };

    let forwarded = transport.send(outbound).await?;
    let body = forwarded.text();

    Ok(Response {
        status: forwarded.status,
        headers: forwarded.header_map(),
        body: Some(body).filter(|body| !body.is_empty()),
    })
}
