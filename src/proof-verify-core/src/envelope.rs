//! Upstream response envelopes.
//!
//! Upstream services wrap their payloads inconsistently: some return the
//! data bare, some as `{"data": ...}`, some as `{"result": ...}`, sometimes
//! with `success`/`message` siblings. [`ResponseEnvelope::open`] removes
//! exactly one such layer so the rest of the engine works on the payload
//! directly.

use serde_json::Value;

/// Keys that wrap the payload.
const WRAPPER_KEYS: &[&str] = &["data", "result"];

/// Sibling keys allowed next to a wrapper key.
const META_KEYS: &[&str] = &["success", "status", "message", "ok", "error", "meta"];

/// Keys that carry a derived handle for create/poll queries.
const HANDLE_KEYS: &[&str] = &["queryHash", "handle", "queryId", "query_id"];

/// An opened upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    payload: Value,
}

impl ResponseEnvelope {
    /// Open one wrapper layer, if present.
    ///
    /// A wrapper is an object whose keys are exactly one of
    /// [`WRAPPER_KEYS`] plus any number of metadata keys.
    #[must_use]
    pub fn open(body: Value) -> Self {
        let payload = match body {
            Value::Object(mut map) => {
                let wrapper = WRAPPER_KEYS
                    .iter()
                    .filter(|k| map.contains_key(**k))
                    .collect::<Vec<_>>();
                let only_meta_besides = map
                    .keys()
                    .all(|k| WRAPPER_KEYS.contains(&k.as_str()) || META_KEYS.contains(&k.as_str()));

                if wrapper.len() == 1 && only_meta_besides {
                    map.remove(*wrapper[0]).unwrap_or(Value::Null)
                } else {
                    Value::Object(map)
                }
            },
            other => other,
        };
        Self { payload }
    }

    /// The unwrapped payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume into the unwrapped payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Derived handle for a create/poll query, if the payload carries one.
    #[must_use]
    pub fn derived_handle(&self) -> Option<String> {
        let map = self.payload.as_object()?;
        HANDLE_KEYS.iter().find_map(|key| match map.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Whether a body carries no usable data.
///
/// `null`, empty strings, empty arrays and empty objects all count as empty.
#[must_use]
pub fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_data_wrapper() {
        let env = ResponseEnvelope::open(json!({"success": true, "data": {"x": 1}}));
        assert_eq!(env.payload(), &json!({"x": 1}));
    }

    #[test]
    fn test_open_result_wrapper() {
        let env = ResponseEnvelope::open(json!({"result": [1, 2]}));
        assert_eq!(env.payload(), &json!([1, 2]));
    }

    #[test]
    fn test_opens_only_one_layer() {
        let env = ResponseEnvelope::open(json!({"data": {"data": {"queryHash": "q1"}}}));
        assert_eq!(env.payload(), &json!({"data": {"queryHash": "q1"}}));
        assert_eq!(env.derived_handle(), None);
    }

    #[test]
    fn test_bare_object_with_data_field_is_not_unwrapped() {
        // "data" next to real payload fields is content, not a wrapper.
        let body = json!({"hash": "0xab", "data": "payload"});
        let env = ResponseEnvelope::open(body.clone());
        assert_eq!(env.payload(), &body);
    }

    #[test]
    fn test_derived_handle_variants() {
        for key in ["queryHash", "handle", "queryId", "query_id"] {
            let mut inner = serde_json::Map::new();
            inner.insert(key.to_string(), json!(" h-1 "));
            let env = ResponseEnvelope::open(json!({ "data": Value::Object(inner) }));
            assert_eq!(env.derived_handle().as_deref(), Some("h-1"), "key {}", key);
        }
        let numeric = ResponseEnvelope::open(json!({"queryId": 42}));
        assert_eq!(numeric.derived_handle().as_deref(), Some("42"));
        let blank = ResponseEnvelope::open(json!({"handle": ""}));
        assert_eq!(blank.derived_handle(), None);
    }

    #[test]
    fn test_is_empty_body() {
        assert!(is_empty_body(&json!(null)));
        assert!(is_empty_body(&json!("")));
        assert!(is_empty_body(&json!([])));
        assert!(is_empty_body(&json!({})));
        assert!(!is_empty_body(&json!(0)));
        assert!(!is_empty_body(&json!(false)));
        assert!(!is_empty_body(&json!([null])));
    }
}
