//! Signals: named observations about the text not anchored to a span.
//!
//! Signals form a nested JSON-valued map (`serde_json::Value` is the
//! Null/Bool/Num/Str/List/Map sum type) addressable by dot-path, e.g.
//! `security.prompt_injection`. A missing path reads as null.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nested signal map produced by the non-entity analyzers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signals(pub Map<String, Value>);

impl Signals {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a top-level signal.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Look up a value by dot-path. Returns `None` when any segment of the
    /// path is missing or the intermediate value is not a map.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut cur = self.0.get(first)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// The whole map as a single JSON value (for persistence).
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Signals {
        let mut s = Signals::new();
        s.insert("persona", json!("dev"));
        s.insert("context_keywords", json!(["docker", "api"]));
        s.insert("risk_boost", json!(0.15));
        s.insert(
            "security",
            json!({
                "decision": "BLOCK",
                "score": 0.6,
                "prompt_injection": true,
            }),
        );
        s
    }

    #[test]
    fn test_top_level_lookup() {
        let s = sample();
        assert_eq!(s.get("persona"), Some(&json!("dev")));
        assert_eq!(s.get("risk_boost"), Some(&json!(0.15)));
    }

    #[test]
    fn test_dot_path_lookup() {
        let s = sample();
        assert_eq!(s.get("security.decision"), Some(&json!("BLOCK")));
        assert_eq!(s.get("security.prompt_injection"), Some(&json!(true)));
    }

    #[test]
    fn test_missing_path_is_none() {
        let s = sample();
        assert_eq!(s.get("security.nope"), None);
        assert_eq!(s.get("nope"), None);
        assert_eq!(s.get("persona.deeper"), None);
    }

    #[test]
    fn test_serde_transparent() {
        let s = sample();
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["security"]["score"], json!(0.6));
    }
}
