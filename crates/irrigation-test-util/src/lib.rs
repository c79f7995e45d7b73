//! Shared test utilities for the irrigation workspace.
//!
//! A separate crate so any test suite in the workspace can depend on it without pulling in the
//! application crates.

use serde_json::Value;

const TIMESTAMP_KEYS: &[&str] = &[
    "at",
    "created_at",
    "expires_at",
    "recorded_at",
    "dead_lettered_at",
];

const ID_KEYS: &[&str] = &["trace_id", "correlation_id"];

const HASH_KEYS: &[&str] = &["hash", "prev_hash"];

/// Normalize non-deterministic JSON fields for snapshot comparison.
///
/// Applied at any depth:
///
/// - timestamp keys become `"__TIMESTAMP__"`
/// - generated signal ids (`sig-` followed by a UUID) become `"__SIGNAL_ID__"`, wherever they
///   appear as a string value
/// - `trace_id` and `correlation_id` become `"__ID__"`
/// - ledger `hash` and `prev_hash` become `"__HASH__"`
/// - any key ending in `_us` becomes `0`, and histogram `buckets` become empty
///
/// Fixed ids such as `"sig-fixed"` are left alone.
pub fn normalize_nondeterministic(mut value: Value) -> Value {
    normalize_recursive(&mut value);
    value
}

fn normalize_recursive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key = key.as_str();
                if TIMESTAMP_KEYS.contains(&key) && val.is_string() {
                    *val = Value::String("__TIMESTAMP__".to_string());
                } else if ID_KEYS.contains(&key) && val.is_string() {
                    *val = Value::String("__ID__".to_string());
                } else if HASH_KEYS.contains(&key) && val.is_string() {
                    *val = Value::String("__HASH__".to_string());
                } else if key.ends_with("_us") && val.is_number() {
                    *val = Value::Number(0.into());
                } else if key == "buckets" && val.is_array() {
                    *val = Value::Array(Vec::new());
                } else {
                    normalize_recursive(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                normalize_recursive(val);
            }
        }
        Value::String(s) if is_generated_signal_id(s) => {
            *s = "__SIGNAL_ID__".to_string();
        }
        _ => {}
    }
}

/// `sig-` plus a hyphenated UUID.
fn is_generated_signal_id(s: &str) -> bool {
    let Some(uuid) = s.strip_prefix("sig-") else {
        return false;
    };
    let groups: Vec<&str> = uuid.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_fields_are_normalized() {
        let input = json!({
            "signal_id": "sig-0b7d6a0e-8f1c-4e59-9a53-2f6f2c1d9e44",
            "history": [
                { "state": "CREATED", "at": "2026-01-01T00:00:00Z" }
            ],
            "gates": [
                { "gate": "scope_alignment", "passed": true, "latency_us": 17 }
            ],
            "audit": { "seq": 3, "hash": "ab12" }
        });

        let result = normalize_nondeterministic(input);

        assert_eq!(result["signal_id"], "__SIGNAL_ID__");
        assert_eq!(result["history"][0]["at"], "__TIMESTAMP__");
        assert_eq!(result["history"][0]["state"], "CREATED");
        assert_eq!(result["gates"][0]["latency_us"], 0);
        assert_eq!(result["audit"]["hash"], "__HASH__");
        assert_eq!(result["audit"]["seq"], 3);
    }

    #[test]
    fn fixed_ids_are_kept() {
        let input = json!({ "signal_id": "sig-fixed", "parent": "sig-1234" });
        let result = normalize_nondeterministic(input.clone());
        assert_eq!(result, input);
    }

    #[test]
    fn histograms_keep_counts_but_drop_buckets() {
        let input = json!({
            "latency": {
                "buckets": [ { "le_us": 50, "count": 1 } ],
                "count": 1,
                "sum_us": 42
            }
        });

        let result = normalize_nondeterministic(input);

        assert_eq!(
            result,
            json!({ "latency": { "buckets": [], "count": 1, "sum_us": 0 } })
        );
    }

    #[test]
    fn non_string_timestamps_are_untouched() {
        let input = json!({ "at": 5 });
        assert_eq!(normalize_nondeterministic(input.clone()), input);
    }
}
