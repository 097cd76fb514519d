//! Entity type canonicalization.
//!
//! Detector-specific labels (e.g. the NER analyzer's `EMAIL_ADDRESS`,
//! `PHONE_NUMBER`) are rewritten to the canonical taxonomy before merging,
//! so the rule engine only ever sees one label per concept. Unknown labels
//! pass through unchanged, which makes normalization idempotent.

use crate::scan::entity::Entity;

/// Maps detector-specific entity labels to the canonical taxonomy.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeNormalizer;

impl TypeNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Canonical label for a raw detector label.
    pub fn normalize(&self, raw: &str) -> String {
        let key = raw.trim();
        match key {
            "EMAIL_ADDRESS" => "EMAIL",
            "PHONE_NUMBER" => "PHONE",
            "US_SSN" => "SSN",
            "IP_ADDRESS" => "IP",
            "DOMAIN_NAME" => "DOMAIN",
            other => other,
        }
        .to_string()
    }

    /// Rewrite entity types in place.
    pub fn normalize_all(&self, entities: &mut [Entity]) {
        for e in entities.iter_mut() {
            e.entity_type = self.normalize(&e.entity_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::entity::SOURCE_NER;

    #[test]
    fn test_known_labels_map() {
        let n = TypeNormalizer::new();
        assert_eq!(n.normalize("EMAIL_ADDRESS"), "EMAIL");
        assert_eq!(n.normalize("PHONE_NUMBER"), "PHONE");
        assert_eq!(n.normalize("US_SSN"), "SSN");
        assert_eq!(n.normalize("IP_ADDRESS"), "IP");
        assert_eq!(n.normalize("DOMAIN_NAME"), "DOMAIN");
    }

    #[test]
    fn test_unknown_labels_pass_through() {
        let n = TypeNormalizer::new();
        assert_eq!(n.normalize("CCCD"), "CCCD");
        assert_eq!(n.normalize("SOMETHING_ELSE"), "SOMETHING_ELSE");
    }

    #[test]
    fn test_idempotent() {
        let n = TypeNormalizer::new();
        for raw in ["EMAIL_ADDRESS", "EMAIL", "CCCD", "WEIRD"] {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once);
        }
    }

    #[test]
    fn test_normalize_all_in_place() {
        let n = TypeNormalizer::new();
        let mut entities = vec![Entity {
            entity_type: "EMAIL_ADDRESS".to_string(),
            start: 0,
            end: 5,
            score: 0.8,
            source: SOURCE_NER.to_string(),
            text: "a@b.c".to_string(),
            metadata: serde_json::Map::new(),
        }];
        n.normalize_all(&mut entities);
        assert_eq!(entities[0].entity_type, "EMAIL");
    }
}
