//! Client side: the mode controller and the per-route transform pipeline
//!
//! A [`Jukebox`] installs one [`RouteHandler`] per route on an [`Interceptor`]
//! whenever playback or recording starts. Handlers resolve accepted requests
//! through a [`MockBackend`] and run the route's hooks on the result.

mod backend;
mod handler;
mod interception;
mod route;

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::config::MockingMode;
use crate::network::Transport;
use crate::{JukeboxError, Result};

pub use backend::{EndpointBackend, LocalBackend, MockBackend};
pub use handler::RouteHandler;
pub use interception::{route_claims, Interceptor, LocalInterceptor, StartOptions, UnhandledRequest};
pub use route::{
    BodyHook, HeadersHook, Hooks, JsonBodyHook, RequestHook, Route, RouteContext, StatusHook,
    TextBodyHook,
};

/// Snapshot of a session: which album, in which mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockingState {
    /// Album of the session; `None` while disabled
    pub album: Option<String>,
    /// Session mode
    pub mode: MockingMode,
}

impl MockingState {
    /// State of an active session
    #[must_use]
    pub fn new(album: impl Into<String>, mode: MockingMode) -> Self {
        Self {
            album: Some(album.into()),
            mode,
        }
    }

    /// The initial, disabled state
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Arguments to [`Jukebox::play`] and [`Jukebox::record`]
#[derive(Debug, Clone, Default)]
pub struct EnableOptions {
    /// Album to read from or record into
    pub album: String,
    /// Routes to intercept
    pub routes: Vec<Arc<Route>>,
    /// Merged over the jukebox-wide context
    pub route_context: RouteContext,
    /// Merged over the jukebox-wide start options
    pub start_options: StartOptions,
}

impl EnableOptions {
    /// Options for `album` with no routes yet
    #[must_use]
    pub fn new(album: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            ..Self::default()
        }
    }

    /// Add a route
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(Arc::new(route));
        self
    }

    /// Add several routes
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes.into_iter().map(Arc::new));
        self
    }

    /// Context for this session's hooks
    #[must_use]
    pub fn with_route_context(mut self, route_context: RouteContext) -> Self {
        self.route_context = route_context;
        self
    }

    /// Start options for this session
    #[must_use]
    pub fn with_start_options(mut self, start_options: StartOptions) -> Self {
        self.start_options = start_options;
        self
    }
}

/// Mode controller: switches between disabled, playback and recording
pub struct Jukebox {
    interceptor: Arc<dyn Interceptor>,
    backend: Arc<dyn MockBackend>,
    transport: Arc<dyn Transport>,
    route_context: RouteContext,
    start_options: StartOptions,
    state: RwLock<Arc<MockingState>>,
}

impl Jukebox {
    /// Create a disabled jukebox
    ///
    /// `transport` carries requests the routes' criteria reject.
    #[must_use]
    pub fn new(
        interceptor: Arc<dyn Interceptor>,
        backend: Arc<dyn MockBackend>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            interceptor,
            backend,
            transport,
            route_context: RouteContext::default(),
            start_options: StartOptions::default(),
            state: RwLock::new(Arc::new(MockingState::disabled())),
        }
    }

    /// Context shared with every session's hooks
    #[must_use]
    pub fn with_route_context(mut self, route_context: RouteContext) -> Self {
        self.route_context = route_context;
        self
    }

    /// Start options applied to every session
    #[must_use]
    pub fn with_start_options(mut self, start_options: StartOptions) -> Self {
        self.start_options = start_options;
        self
    }

    /// Serve intercepted requests from recordings
    ///
    /// # Errors
    ///
    /// Returns error if the album or routes are missing, or interception
    /// cannot start
    pub fn play(&self, options: EnableOptions) -> Result<()> {
        self.enable(MockingMode::Playback, options)
    }

    /// Serve intercepted requests live and save them as recordings
    ///
    /// # Errors
    ///
    /// Returns error if the album or routes are missing, or interception
    /// cannot start
    pub fn record(&self, options: EnableOptions) -> Result<()> {
        self.enable(MockingMode::Recording, options)
    }

    /// Disable mocking and tear interception down; a no-op when already disabled
    pub fn stop(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *state, Arc::new(MockingState::disabled()));

        if previous.mode.is_enabled() {
            self.interceptor.reset_handlers();
            self.interceptor.stop();
            info!("[mocking] Stopped {}", previous.mode);
        }
    }

    /// Current session snapshot
    #[must_use]
    pub fn state(&self) -> Arc<MockingState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn enable(&self, mode: MockingMode, options: EnableOptions) -> Result<()> {
        if options.album.is_empty() || options.routes.is_empty() {
            let method = match mode {
                MockingMode::Recording => "record",
                MockingMode::Playback | MockingMode::Disabled => "play",
            };
            return Err(JukeboxError::Config(format!(
                "Missing input: {method} requires an album and routes"
            )));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.mode.is_enabled() {
            self.interceptor.stop();
            self.interceptor.reset_handlers();
        }

        // The previous session is already torn down, so a failed start leaves us disabled
        if let Err(e) = self
            .interceptor
            .start(&self.start_options.merged(&options.start_options))
        {
            *state = Arc::new(MockingState::disabled());
            return Err(e);
        }

        let snapshot = Arc::new(MockingState::new(options.album, mode));
        *state = Arc::clone(&snapshot);

        let context = self.route_context.merged(&options.route_context);
        let handlers = options
            .routes
            .into_iter()
            .map(|route| {
                RouteHandler::new(
                    route,
                    Arc::clone(&snapshot),
                    context.clone(),
                    Arc::clone(&self.backend),
                    Arc::clone(&self.transport),
                )
            })
            .collect();
        self.interceptor.use_handlers(handlers);

        info!(
            "[mocking] {} album {:?}",
            mode,
            snapshot.album.as_deref().unwrap_or_default()
        );
        Ok(())
    }
}
