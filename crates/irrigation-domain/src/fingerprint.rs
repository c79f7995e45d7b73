use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use irrigation_types::Signal;

/// Stable SHA-256 content fingerprint used for deduplication.
///
/// Identity fields:
/// - signal type
/// - target scopes, in signal order
/// - canonical payload JSON (object keys sorted)
pub fn signal_fingerprint(signal: &Signal) -> String {
    let scopes = signal.target_scopes().join(",");
    let payload = canonical_json(signal.payload());
    let canonical = [signal.signal_type().as_str(), scopes.as_str(), payload.as_str()].join("|");
    sha256_hex(canonical.as_bytes())
}

/// Serialize with sorted object keys regardless of how the value was built.
pub fn canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        JsonValue::String(k.clone()),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        JsonValue::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrigation_types::SignalType;
    use serde_json::json;

    fn signal(payload: JsonValue) -> Signal {
        Signal::builder(SignalType::ScoringPrimary, 4)
            .scopes(["Q042", "PA02"])
            .payload(payload)
            .build()
            .unwrap()
    }

    #[test]
    fn fingerprint_ignores_id_and_metadata() {
        let a = signal(json!({"score": 0.5}));
        let b = signal(json!({"score": 0.5}));
        assert_ne!(a.id(), b.id());
        assert_eq!(signal_fingerprint(&a), signal_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_payload() {
        let a = signal(json!({"score": 0.5}));
        let b = signal(json!({"score": 0.6}));
        assert_ne!(signal_fingerprint(&a), signal_fingerprint(&b));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        assert_eq!(
            canonical_json(&json!({"b": 1, "a": {"d": [1, "x"], "c": null}})),
            r#"{"a":{"c":null,"d":[1,"x"]},"b":1}"#
        );
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = signal_fingerprint(&signal(json!(null)));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
