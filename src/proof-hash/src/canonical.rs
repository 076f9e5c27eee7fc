//! Canonical serialization and hashing of JSON payloads.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::ContentHash;

/// Serialize a JSON value in canonical form.
///
/// Object keys are emitted in byte order at every nesting level, with no
/// insignificant whitespace. Arrays keep their order. Strings and numbers
/// use `serde_json`'s standard encoding.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // A string key always serializes.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 over raw bytes.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    ContentHash::from_bytes(hasher.finalize().into())
}

/// SHA-256 over the canonical JSON form of `value`.
///
/// This is the anchoring procedure: the ledger commits exactly this hash.
#[must_use]
pub fn canonical_hash(value: &Value) -> ContentHash {
    hash_bytes(canonical_json(value).as_bytes())
}

/// Remove top-level fields from an object payload.
///
/// Non-object values are returned unchanged. Returns the cleaned payload and
/// the names of the fields that were actually present and removed.
#[must_use]
pub fn strip_fields<S: AsRef<str>>(value: &Value, fields: &[S]) -> (Value, Vec<String>) {
    match value {
        Value::Object(map) => {
            let mut cleaned = map.clone();
            let mut removed = Vec::new();
            for field in fields {
                if cleaned.remove(field.as_ref()).is_some() {
                    removed.push(field.as_ref().to_string());
                }
            }
            (Value::Object(cleaned), removed)
        },
        other => (other.clone(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "y": [3, {"d": null, "c": "x"}]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"y":[3,{"c":"x","d":null}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let value = json!({"note": "line\n\"quoted\""});
        assert_eq!(canonical_json(&value), r#"{"note":"line\n\"quoted\""}"#);
    }

    #[test]
    fn test_known_digest() {
        // SHA-256 of the empty object "{}".
        let h = canonical_hash(&json!({}));
        assert_eq!(
            h.to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_strip_fields_reports_removed() {
        let value = json!({"lat": 1.5, "hash": "0xabc", "updatedAt": 5});
        let (clean, removed) = strip_fields(&value, &["hash", "updatedAt", "_id"]);
        assert_eq!(clean, json!({"lat": 1.5}));
        assert_eq!(removed, vec!["hash".to_string(), "updatedAt".to_string()]);
    }

    #[test]
    fn test_strip_fields_non_object_untouched() {
        let value = json!([1, 2, 3]);
        let (clean, removed) = strip_fields(&value, &["hash"]);
        assert_eq!(clean, value);
        assert!(removed.is_empty());
    }
}
