//! Recording keys: stable hashes of the fields a route chose to match on
//!
//! Only declared criteria feed the key, so unrelated header or body noise never splits one
//! logical request across several recordings. The key covers:
//! 1. `body`: the body criterion, verbatim
//! 2. `headers`: the header criterion resolved to concrete name → value pairs
//!
//! Method, host and path are not part of the key; they are already encoded in the
//! recording location.

use std::fmt::Write as _;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::matching::RouteMatch;
use crate::message::Request;

/// Number of digest bytes kept in a key (rendered as twice as many hex chars)
pub const KEY_BYTES: usize = 16;

/// Derive the recording key for a request and the match entry that selected it
#[must_use]
pub fn derive_key(request: &Request, selected: Option<&RouteMatch>) -> String {
    let identity = match_identity(request, selected);

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&identity).as_bytes());
    let digest = hasher.finalize();

    hex::encode(&digest[..KEY_BYTES])
}

/// The object that is hashed: only the declared criteria
#[must_use]
pub fn match_identity(request: &Request, selected: Option<&RouteMatch>) -> Value {
    let mut identity = Map::new();

    if let Some(entry) = selected {
        if let Some(body) = entry.body_criterion() {
            identity.insert("body".to_string(), body.clone());
        }

        // The names form hashes with the values the request actually carries
        if let Some(headers) = entry.header_criterion() {
            let resolved = headers
                .resolve(request)
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            identity.insert("headers".to_string(), Value::Object(resolved));
        }
    }

    Value::Object(identity)
}

/// Compact JSON with object keys sorted at every level
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(&fields[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn test_request() -> Request {
        Request::new("POST", "http://localhost:4000/api/search")
            .with_header("content-type", "application/json")
            .with_header("x-tenant", "blue")
            .with_header("x-request-id", "abc123")
            .with_body(r#"{"query":"cats","page":1}"#)
    }

    #[test]
    fn test_key_deterministic() {
        let entry = RouteMatch::new().with_body(json!({"query": "cats"}));
        let key1 = derive_key(&test_request(), Some(&entry));
        let key2 = derive_key(&test_request(), Some(&entry));

        assert_eq!(key1, key2, "Key must be deterministic");
        assert_eq!(key1.len(), KEY_BYTES * 2);
        assert!(key1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_no_criteria_key_is_constant() {
        let a = derive_key(&test_request(), None);
        let b = derive_key(&Request::new("GET", "http://example.com/other"), None);
        let c = derive_key(&test_request(), Some(&RouteMatch::new()));

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_unmatched_header_does_not_change_key() {
        let entry = RouteMatch::new().with_header_names(["x-tenant"]);
        let key1 = derive_key(&test_request(), Some(&entry));

        let noisy = test_request().with_header("x-request-id", "zzz999");
        let key2 = derive_key(&noisy, Some(&entry));

        assert_eq!(key1, key2, "Undeclared headers must not affect the key");
    }

    #[test]
    fn test_matched_header_value_changes_key() {
        let entry = RouteMatch::new().with_header_names(["x-tenant"]);
        let key1 = derive_key(&test_request(), Some(&entry));

        let other = test_request().with_header("x-tenant", "red");
        let key2 = derive_key(&other, Some(&entry));

        assert_ne!(key1, key2, "Declared header values select the variant");
    }

    #[test]
    fn test_names_form_resolves_to_values() {
        let names = RouteMatch::new().with_header_names(["X-Tenant"]);
        let values = RouteMatch::new().with_header_values([("x-tenant", "blue")]);

        assert_eq!(
            match_identity(&test_request(), Some(&names)),
            json!({"headers": {"x-tenant": "blue"}})
        );
        assert_eq!(
            derive_key(&test_request(), Some(&names)),
            derive_key(&test_request(), Some(&values))
        );
    }

    #[test]
    fn test_body_criterion_is_verbatim() {
        let entry = RouteMatch::new().with_body(json!({"query": "cats"}));
        let changed_body = test_request().with_body(r#"{"query":"cats","page":2}"#);

        assert_eq!(
            derive_key(&test_request(), Some(&entry)),
            derive_key(&changed_body, Some(&entry))
        );
        assert_eq!(
            match_identity(&test_request(), Some(&entry)),
            json!({"body": {"query": "cats"}})
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"b": [{"z": 1, "a": null}], "a": "x\"y"});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":"x\"y","b":[{"a":null,"z":1}]}"#
        );
    }

    proptest! {
        #[test]
        fn prop_noise_headers_never_change_key(
            tenant in "[a-z]{1,8}",
            noise in prop::collection::btree_map("x-noise-[a-z]{1,6}", "[ -~]{0,12}", 0..6),
        ) {
            let entry = RouteMatch::new().with_header_names(["x-tenant"]);
            let base = Request::new("GET", "http://localhost/a").with_header("x-tenant", tenant);
            let mut noisy = base.clone();
            noisy.headers.extend(noise);

            prop_assert_eq!(derive_key(&base, Some(&entry)), derive_key(&noisy, Some(&entry)));
        }
    }
}
