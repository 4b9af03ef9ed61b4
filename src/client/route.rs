//! Route definitions and their transform hooks

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::matching::MatchCriteria;
use crate::message::{Request, Response};

/// Rewrites an accepted request before it is resolved
pub type RequestHook = Arc<dyn Fn(Request, &RouteContext) -> Request + Send + Sync>;

/// Rewrites the mock status
pub type StatusHook = Arc<dyn Fn(u16, &Request, &Response, &RouteContext) -> u16 + Send + Sync>;

/// Rewrites the mock headers
pub type HeadersHook = Arc<
    dyn Fn(BTreeMap<String, String>, &Request, &Response, &RouteContext) -> BTreeMap<String, String>
        + Send
        + Sync,
>;

/// Rewrites the mock body as text
pub type TextBodyHook =
    Arc<dyn Fn(String, &Request, &Response, &RouteContext) -> String + Send + Sync>;

/// Rewrites the mock body as parsed JSON
pub type JsonBodyHook =
    Arc<dyn Fn(Value, &Request, &Response, &RouteContext) -> Value + Send + Sync>;

/// The single body hook a route may carry
#[derive(Clone)]
pub enum BodyHook {
    /// Receives the body parsed as JSON
    Json(JsonBodyHook),
    /// Receives the body as text
    Text(TextBodyHook),
}

impl fmt::Debug for BodyHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(_) => f.write_str("Json"),
            Self::Text(_) => f.write_str("Text"),
        }
    }
}

/// Hooks declared by a route, at most one of each kind
#[derive(Clone, Default)]
pub struct Hooks {
    /// Applied to the accepted request
    pub request: Option<RequestHook>,
    /// Applied to the mock status
    pub status: Option<StatusHook>,
    /// Applied to the mock headers
    pub headers: Option<HeadersHook>,
    /// Applied to the mock body
    pub body: Option<BodyHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("request", &self.request.is_some())
            .field("status", &self.status.is_some())
            .field("headers", &self.headers.is_some())
            .field("body", &self.body)
            .finish()
    }
}

/// A request pattern to intercept, with its match criteria and hooks
///
/// ```
/// use jukebox::client::Route;
/// use jukebox::matching::RouteMatch;
///
/// let route = Route::get("http://localhost:4000/timestamp")
///     .with_match(RouteMatch::new().with_header_names(["accept-language"]))
///     .transform_response_body_text(|body, _, _, _| body.trim().to_string());
/// assert_eq!(route.method(), "GET");
/// ```
#[derive(Debug, Clone)]
pub struct Route {
    url: String,
    method: String,
    match_criteria: Option<MatchCriteria>,
    hooks: Hooks,
}

impl Route {
    /// Route for `method` requests to `url`
    ///
    /// `url` is an absolute URL, a path, or either of those ending in `*` to
    /// match by prefix.
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.to_ascii_uppercase(),
            match_criteria: None,
            hooks: Hooks::default(),
        }
    }

    /// Route for GET requests
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Route for POST requests
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Restrict interception to requests satisfying `criteria`
    #[must_use]
    pub fn with_match(mut self, criteria: impl Into<MatchCriteria>) -> Self {
        self.match_criteria = Some(criteria.into());
        self
    }

    /// Rewrite accepted requests before they are resolved
    #[must_use]
    pub fn transform_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(Request, &RouteContext) -> Request + Send + Sync + 'static,
    {
        self.hooks.request = Some(Arc::new(hook));
        self
    }

    /// Rewrite the mock status
    #[must_use]
    pub fn transform_response_status<F>(mut self, hook: F) -> Self
    where
        F: Fn(u16, &Request, &Response, &RouteContext) -> u16 + Send + Sync + 'static,
    {
        self.hooks.status = Some(Arc::new(hook));
        self
    }

    /// Rewrite the mock headers
    #[must_use]
    pub fn transform_response_headers<F>(mut self, hook: F) -> Self
    where
        F: Fn(BTreeMap<String, String>, &Request, &Response, &RouteContext) -> BTreeMap<String, String>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.headers = Some(Arc::new(hook));
        self
    }

    /// Rewrite the mock body as text
    ///
    /// Ignored when a JSON body hook is already declared.
    #[must_use]
    pub fn transform_response_body_text<F>(mut self, hook: F) -> Self
    where
        F: Fn(String, &Request, &Response, &RouteContext) -> String + Send + Sync + 'static,
    {
        if !matches!(self.hooks.body, Some(BodyHook::Json(_))) {
            self.hooks.body = Some(BodyHook::Text(Arc::new(hook)));
        }
        self
    }

    /// Rewrite the mock body as JSON; takes precedence over a text body hook
    #[must_use]
    pub fn transform_response_body_json<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value, &Request, &Response, &RouteContext) -> Value + Send + Sync + 'static,
    {
        self.hooks.body = Some(BodyHook::Json(Arc::new(hook)));
        self
    }

    /// URL pattern
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Uppercase HTTP method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Match criteria, if any
    #[must_use]
    pub fn match_criteria(&self) -> Option<&MatchCriteria> {
        self.match_criteria.as_ref()
    }

    /// Declared hooks
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

/// Values shared with every hook of a session
///
/// Values are reference-counted, so a hook sees whatever an `Arc`-shared
/// cell holds when it runs, not when the session started.
#[derive(Clone, Default)]
pub struct RouteContext {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl RouteContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `key`
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a value under `key`
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Value under `key`, if present and of type `T`
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref::<T>()
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// This context overlaid with `overrides`; keys in `overrides` win
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut values = self.values.clone();
        values.extend(
            overrides
                .values
                .iter()
                .map(|(key, value)| (key.clone(), Arc::clone(value))),
        );
        Self { values }
    }
}

impl fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("RouteContext").field("keys", &keys).finish()
    }
}
