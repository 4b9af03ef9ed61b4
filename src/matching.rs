//! Match criteria: decide whether an intercepted request should be mocked
//!
//! URL and method are matched by whoever intercepts the request; the functions here only
//! look at the header and body criteria a route declares. All of them are pure.
//!
//! Semantics:
//! - a route without criteria matches everything;
//! - a list of criteria matches when **any** entry matches (an empty list is no criteria);
//! - within one entry the header and body criteria must **both** match;
//! - a list of header names is a presence check, values ignored;
//! - a map of headers is a subset check with exactly equal values;
//! - a body criterion is a substring test against the stringified request body; object and
//!   array criteria also match as a JSON fragment (subset) anywhere in a JSON request body.
//!
//! Empty criteria (`{}`, `[]`, `""`, `null`) count as "not declared" for their field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{value_text, Request};

/// Header criterion of a [`RouteMatch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderCriterion {
    /// Header names that must be present, values ignored
    Names(Vec<String>),
    /// Header names with the exact values they must carry
    Values(BTreeMap<String, String>),
}

impl HeaderCriterion {
    /// Whether the criterion declares nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Names(names) => names.is_empty(),
            Self::Values(values) => values.is_empty(),
        }
    }

    /// Test the criterion against a request's headers
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Self::Names(names) => names.iter().all(|name| request.has_header(name)),
            Self::Values(values) => values
                .iter()
                .all(|(name, value)| request.header(name) == Some(value.as_str())),
        }
    }

    /// Concrete name → value pairs this criterion selects from a request
    ///
    /// Names are lowercased. For the names form, values come from the request and names
    /// the request does not carry are left out.
    #[must_use]
    pub fn resolve(&self, request: &Request) -> BTreeMap<String, String> {
        match self {
            Self::Names(names) => names
                .iter()
                .filter_map(|name| {
                    request
                        .header(name)
                        .map(|value| (name.to_ascii_lowercase(), value.to_string()))
                })
                .collect(),
            Self::Values(values) => values
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .collect(),
        }
    }
}

/// One set of match criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    /// Fragment that must appear in the request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Headers that must be present (names) or equal (map)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderCriterion>,
}

impl RouteMatch {
    /// Criteria that match every request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a body fragment
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Require the presence of headers
    #[must_use]
    pub fn with_header_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(HeaderCriterion::Names(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Require headers with exact values
    #[must_use]
    pub fn with_header_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = Some(HeaderCriterion::Values(
            values
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        ));
        self
    }

    /// Body criterion, if one is declared
    #[must_use]
    pub fn body_criterion(&self) -> Option<&Value> {
        self.body.as_ref().filter(|body| !is_empty_value(body))
    }

    /// Header criterion, if one is declared
    #[must_use]
    pub fn header_criterion(&self) -> Option<&HeaderCriterion> {
        self.headers.as_ref().filter(|headers| !headers.is_empty())
    }

    /// Whether both the header and the body criterion accept the request
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        self.header_criterion()
            .map_or(true, |headers| headers.matches(request))
            && self
                .body_criterion()
                .map_or(true, |body| body_contains(request, body))
    }
}

/// The `match` property of a route: one entry or a list of alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchCriteria {
    /// Alternatives; any one matching is enough
    Many(Vec<RouteMatch>),
    /// A single entry
    One(RouteMatch),
}

impl From<RouteMatch> for MatchCriteria {
    fn from(entry: RouteMatch) -> Self {
        Self::One(entry)
    }
}

impl From<Vec<RouteMatch>> for MatchCriteria {
    fn from(entries: Vec<RouteMatch>) -> Self {
        Self::Many(entries)
    }
}

impl MatchCriteria {
    /// Entries as a slice
    #[must_use]
    pub fn entries(&self) -> &[RouteMatch] {
        match self {
            Self::Many(entries) => entries,
            Self::One(entry) => std::slice::from_ref(entry),
        }
    }
}

/// Result of evaluating a route's criteria against a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome<'a> {
    /// The route declares no criteria
    Unconstrained,
    /// This entry accepted the request
    Matched(&'a RouteMatch),
    /// No entry accepted the request
    Rejected,
}

impl<'a> MatchOutcome<'a> {
    /// Whether the request should be mocked
    #[must_use]
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::Rejected)
    }

    /// The entry that selected the recording variant
    #[must_use]
    pub fn selected(&self) -> Option<&'a RouteMatch> {
        match *self {
            Self::Matched(entry) => Some(entry),
            Self::Unconstrained | Self::Rejected => None,
        }
    }
}

/// Evaluate criteria against a request, reporting which entry matched
#[must_use]
pub fn evaluate<'a>(criteria: Option<&'a MatchCriteria>, request: &Request) -> MatchOutcome<'a> {
    let Some(criteria) = criteria else {
        return MatchOutcome::Unconstrained;
    };

    let entries = criteria.entries();
    if entries.is_empty() {
        return MatchOutcome::Unconstrained;
    }

    entries
        .iter()
        .find(|entry| entry.matches(request))
        .map_or(MatchOutcome::Rejected, MatchOutcome::Matched)
}

/// Whether a request satisfies the criteria
#[must_use]
pub fn matches(criteria: Option<&MatchCriteria>, request: &Request) -> bool {
    evaluate(criteria, request).is_match()
}

fn body_contains(request: &Request, criterion: &Value) -> bool {
    let body = request.body_text().unwrap_or_default();
    if body.contains(&value_text(criterion)) {
        return true;
    }

    // Structured criteria also match as a JSON fragment, whatever the key order or
    // the sibling fields around them
    if !matches!(criterion, Value::Object(_) | Value::Array(_)) {
        return false;
    }
    serde_json::from_str::<Value>(&body).is_ok_and(|parsed| contains_fragment(&parsed, criterion))
}

/// Whether `fragment` is a subset of `value` or of any value nested inside it
fn contains_fragment(value: &Value, fragment: &Value) -> bool {
    if is_subset(value, fragment) {
        return true;
    }

    match value {
        Value::Object(fields) => fields.values().any(|child| contains_fragment(child, fragment)),
        Value::Array(items) => items.iter().any(|child| contains_fragment(child, fragment)),
        _ => false,
    }
}

/// Objects: every field present with a subset value. Arrays: every element subset of
/// some element. Scalars: equal.
fn is_subset(value: &Value, fragment: &Value) -> bool {
    match (value, fragment) {
        (Value::Object(fields), Value::Object(wanted)) => wanted.iter().all(|(key, wanted)| {
            fields
                .get(key)
                .is_some_and(|field| is_subset(field, wanted))
        }),
        (Value::Array(items), Value::Array(wanted)) => wanted
            .iter()
            .all(|wanted| items.iter().any(|item| is_subset(item, wanted))),
        _ => value == fragment,
    }
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn request() -> Request {
        Request::new("POST", "http://localhost:4000/api")
            .with_header("content-type", "application/json")
            .with_header("x-tenant", "blue")
            .with_body(r#"{"a":1,"b":2}"#)
    }

    #[test]
    fn test_no_criteria_matches() {
        assert!(matches(None, &request()));
        assert_eq!(evaluate(None, &request()), MatchOutcome::Unconstrained);
    }

    #[test]
    fn test_empty_criteria_match() {
        let empty_entry = MatchCriteria::One(RouteMatch::new());
        assert!(matches(Some(&empty_entry), &request()));

        let empty_list = MatchCriteria::Many(vec![]);
        assert_eq!(
            evaluate(Some(&empty_list), &request()),
            MatchOutcome::Unconstrained
        );

        let empty_fields: MatchCriteria =
            serde_json::from_value(json!({"headers": {}, "body": {}})).unwrap();
        assert!(matches(Some(&empty_fields), &request()));

        let empty_names: MatchCriteria = serde_json::from_value(json!({"headers": []})).unwrap();
        assert!(matches(Some(&empty_names), &Request::new("GET", "http://x/")));
    }

    #[test]
    fn test_header_names_presence_only() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_header_names(["x-tenant"]));
        assert!(matches(Some(&criteria), &request()));

        let other_value = request().with_header("x-tenant", "red");
        assert!(matches(Some(&criteria), &other_value));

        let criteria = MatchCriteria::One(
            RouteMatch::new().with_header_names(["x-tenant", "authorization"]),
        );
        assert!(!matches(Some(&criteria), &request()));
    }

    #[test]
    fn test_header_names_ignore_case() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_header_names(["Content-Type"]));
        assert!(matches(Some(&criteria), &request()));
    }

    #[test]
    fn test_header_values_subset() {
        let criteria =
            MatchCriteria::One(RouteMatch::new().with_header_values([("x-tenant", "blue")]));
        assert!(matches(Some(&criteria), &request()));

        let criteria =
            MatchCriteria::One(RouteMatch::new().with_header_values([("x-tenant", "red")]));
        assert!(!matches(Some(&criteria), &request()));

        let criteria =
            MatchCriteria::One(RouteMatch::new().with_header_values([("x-missing", "blue")]));
        assert!(!matches(Some(&criteria), &request()));
    }

    #[test]
    fn test_body_is_substring_test() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_body(json!({"a": 1})));
        assert!(matches(Some(&criteria), &request()));

        let other = Request::new("POST", "http://localhost:4000/api").with_body(r#"{"a":2}"#);
        assert!(!matches(Some(&criteria), &other));

        let criteria = MatchCriteria::One(RouteMatch::new().with_body("\"b\":2"));
        assert!(matches(Some(&criteria), &request()));
    }

    #[test]
    fn test_body_object_criterion_ignores_key_order() {
        let criteria = MatchCriteria::One(
            RouteMatch::new().with_body(json!({"username": "ada", "password": "x"})),
        );
        let login = Request::new("POST", "http://localhost:4000/login")
            .with_body(r#"{"username":"ada","password":"x","remember":true}"#);
        assert!(matches(Some(&criteria), &login));

        let wrong_password = Request::new("POST", "http://localhost:4000/login")
            .with_body(r#"{"username":"ada","password":"y","remember":true}"#);
        assert!(!matches(Some(&criteria), &wrong_password));
    }

    #[test]
    fn test_body_nested_fragment() {
        let criteria = MatchCriteria::One(
            RouteMatch::new().with_body(json!({"filter": {"tags": ["red"]}})),
        );
        let request = Request::new("POST", "http://localhost/search")
            .with_body(json!({"page": 2, "filter": {"tags": ["blue", "red"], "limit": 5}}));
        assert!(matches(Some(&criteria), &request));

        let other = Request::new("POST", "http://localhost/search")
            .with_body(json!({"filter": {"tags": ["blue"]}}));
        assert!(!matches(Some(&criteria), &other));
    }

    #[test]
    fn test_body_object_criterion_against_non_json_body() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_body(json!({"a": 1})));
        let text = Request::new("POST", "http://localhost/a").with_body("a=1&b=2");
        assert!(!matches(Some(&criteria), &text));

        let string_criteria = MatchCriteria::One(RouteMatch::new().with_body("b=2"));
        assert!(matches(Some(&string_criteria), &text));
    }

    #[test]
    fn test_body_criterion_against_structured_body() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_body(json!({"query": "q"})));
        let structured = Request::new("POST", "http://localhost/graphql")
            .with_body(json!({"query": {"query": "q"}}));
        assert!(matches(Some(&criteria), &structured));
    }

    #[test]
    fn test_body_criterion_without_request_body() {
        let criteria = MatchCriteria::One(RouteMatch::new().with_body("needle"));
        assert!(!matches(Some(&criteria), &Request::new("GET", "http://x/")));
    }

    #[test]
    fn test_fields_and_within_entry() {
        let criteria = MatchCriteria::One(
            RouteMatch::new()
                .with_header_values([("x-tenant", "blue")])
                .with_body("\"a\":9"),
        );
        assert!(!matches(Some(&criteria), &request()));
    }

    #[test]
    fn test_entries_or_across_list() {
        let criteria = MatchCriteria::Many(vec![
            RouteMatch::new().with_body("\"a\":9"),
            RouteMatch::new().with_body("\"b\":2"),
        ]);
        let req = request();
        let outcome = evaluate(Some(&criteria), &req);
        assert_eq!(outcome.selected(), Some(&criteria.entries()[1]));

        let criteria = MatchCriteria::Many(vec![
            RouteMatch::new().with_body("\"a\":9"),
            RouteMatch::new().with_body("\"b\":9"),
        ]);
        assert_eq!(evaluate(Some(&criteria), &req), MatchOutcome::Rejected);
    }

    #[test]
    fn test_criteria_wire_forms() {
        let one: MatchCriteria =
            serde_json::from_value(json!({"headers": ["accept"], "body": "x"})).unwrap();
        assert!(matches!(one, MatchCriteria::One(_)));

        let many: MatchCriteria =
            serde_json::from_value(json!([{"headers": {"accept": "a"}}, {"body": {"k": 1}}]))
                .unwrap();
        assert_eq!(many.entries().len(), 2);
        assert_eq!(
            many.entries()[0].headers,
            Some(HeaderCriterion::Values(BTreeMap::from([(
                "accept".to_string(),
                "a".to_string()
            )])))
        );
    }

    proptest! {
        #[test]
        fn prop_unconstrained_always_matches(
            headers in prop::collection::btree_map("[a-z-]{1,12}", "[ -~]{0,16}", 0..6),
            body in prop::option::of("[ -~]{0,64}"),
        ) {
            let mut req = Request::new("PUT", "http://localhost/x");
            req.headers = headers;
            req.body = body.map(Value::String);
            prop_assert!(matches(None, &req));
            prop_assert!(matches(Some(&MatchCriteria::One(RouteMatch::new())), &req));
        }

        #[test]
        fn prop_header_map_subset(
            wanted in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{1,8}", 1..5),
            extra in prop::collection::btree_map("x-[a-z]{1,8}", "[a-z0-9]{1,8}", 0..5),
        ) {
            let mut req = Request::new("GET", "http://localhost/x");
            req.headers = extra;
            req.headers.extend(wanted.clone());
            let criteria = MatchCriteria::One(RouteMatch::new().with_header_values(wanted.clone()));
            prop_assert!(matches(Some(&criteria), &req));

            let (name, _) = wanted.iter().next().unwrap();
            let mut changed = req.clone();
            changed.headers.insert(name.clone(), "changed-value!".to_string());
            prop_assert!(!matches(Some(&criteria), &changed));

            let mut removed = req.clone();
            removed.headers.remove(name);
            prop_assert!(!matches(Some(&criteria), &removed));
        }

        #[test]
        fn prop_header_names_presence(
            present in prop::collection::btree_set("[a-z]{1,8}", 0..6),
            wanted in prop::collection::btree_set("[a-z]{1,8}", 1..4),
            value in "[a-z0-9]{0,8}",
        ) {
            let mut req = Request::new("GET", "http://localhost/x");
            for name in &present {
                req.headers.insert(name.clone(), value.clone());
            }
            let criteria = MatchCriteria::One(RouteMatch::new().with_header_names(wanted.clone()));
            let expected = wanted.iter().all(|name| present.contains(name));
            prop_assert_eq!(matches(Some(&criteria), &req), expected);
        }
    }
}
