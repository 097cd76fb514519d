//! Unified entity model shared by all detectors.
//!
//! Spans are half-open **byte offsets** into the original UTF-8 input.
//! The regex engine produces byte offsets natively; merging and masking
//! use the same convention, so an `Entity` can be spliced back into the
//! text it was found in without translation.

use serde::{Deserialize, Serialize};

/// Detector source tag for entities found by the local regex bank.
pub const SOURCE_LOCAL_REGEX: &str = "local_regex";
/// Detector source tag for entities found by the NER analyzer.
pub const SOURCE_NER: &str = "ner";

/// Canonical entity taxonomy. Rules match against these labels only.
pub const CANONICAL_TYPES: &[&str] = &[
    "EMAIL",
    "PHONE",
    "CCCD",
    "TAX_ID",
    "API_SECRET",
    "CREDIT_CARD",
    "SSN",
    "IP",
    "URL",
    "DOMAIN",
];

/// A located finding in user text.
///
/// Entities are immutable once a detector returns them, except for the
/// in-place type canonicalization applied before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical (or detector-raw, pre-normalization) type label
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Confidence score in [0.0, 1.0]
    pub score: f64,
    /// Which detector produced this entity
    pub source: String,
    /// The matched slice of the original text
    pub text: String,
    /// Free-form metadata (normalized form, context level, ...)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    /// Span length in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check the span invariant `0 <= start < end <= len` against an input.
    pub fn span_valid_for(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(start: usize, end: usize) -> Entity {
        Entity {
            entity_type: "EMAIL".to_string(),
            start,
            end,
            score: 0.95,
            source: SOURCE_LOCAL_REGEX.to_string(),
            text: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_span_validation() {
        let text = "hello world";
        assert!(entity(0, 5).span_valid_for(text));
        assert!(!entity(5, 5).span_valid_for(text));
        assert!(!entity(6, 5).span_valid_for(text));
        assert!(!entity(0, 100).span_valid_for(text));
    }

    #[test]
    fn test_span_validation_rejects_non_boundary() {
        let text = "căn cước";
        // byte 1 is inside the 'ă' codepoint
        assert!(!entity(1, 3).span_valid_for(text));
    }

    #[test]
    fn test_serde_uses_type_key() {
        let e = entity(0, 5);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "EMAIL");
        assert_eq!(json["start"], 0);
    }
}
