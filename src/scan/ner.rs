//! NER-based PII detection behind a pluggable analyzer.
//!
//! The actual NER engine (model inference, a sidecar service, ...) lives
//! outside this crate behind the [`NerAnalyzer`] trait. `NerDetector`
//! wraps an analyzer and applies the filtering contract: configured noisy
//! types are dropped, low-confidence findings are dropped, and surviving
//! labels are rewritten to the canonical taxonomy.

use crate::error::Result;
use crate::scan::entity::{Entity, SOURCE_NER};
use crate::scan::normalizer::TypeNormalizer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw finding from an external NER analyzer, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct NerFinding {
    /// Analyzer-native label (e.g. `EMAIL_ADDRESS`, `PHONE_NUMBER`)
    pub label: String,
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Analyzer confidence in [0.0, 1.0]
    pub score: f64,
}

/// External NER/PII analyzer interface.
#[async_trait]
pub trait NerAnalyzer: Send + Sync {
    /// Analyze text and return raw findings with byte offsets.
    async fn analyze(&self, text: &str, language: &str) -> Result<Vec<NerFinding>>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "ner"
    }
}

/// NER detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    /// Whether the NER detector participates in scans.
    pub enabled: bool,
    /// Language passed to the analyzer.
    pub language: String,
    /// Findings below this score are dropped.
    pub min_score: f64,
    /// Analyzer-native labels dropped as noise.
    pub drop_types: Vec<String>,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en".to_string(),
            min_score: 0.5,
            drop_types: vec!["DATE_TIME".to_string(), "URL".to_string()],
        }
    }
}

/// Filtering wrapper around a [`NerAnalyzer`].
pub struct NerDetector {
    analyzer: Arc<dyn NerAnalyzer>,
    config: NerConfig,
    normalizer: TypeNormalizer,
}

impl NerDetector {
    pub fn new(analyzer: Arc<dyn NerAnalyzer>, config: NerConfig) -> Self {
        Self {
            analyzer,
            config,
            normalizer: TypeNormalizer::new(),
        }
    }

    /// Run the analyzer and apply the filtering contract.
    pub async fn scan(&self, text: &str) -> Result<Vec<Entity>> {
        let findings = self.analyzer.analyze(text, &self.config.language).await?;

        let mut entities = Vec::new();
        for f in findings {
            if self.config.drop_types.iter().any(|t| t == &f.label) {
                continue;
            }
            if f.score < self.config.min_score {
                continue;
            }
            if f.start >= f.end
                || f.end > text.len()
                || !text.is_char_boundary(f.start)
                || !text.is_char_boundary(f.end)
            {
                tracing::warn!(
                    analyzer = self.analyzer.name(),
                    label = %f.label,
                    start = f.start,
                    end = f.end,
                    "Dropping NER finding with invalid span"
                );
                continue;
            }
            entities.push(Entity {
                entity_type: self.normalizer.normalize(&f.label),
                start: f.start,
                end: f.end,
                score: f.score,
                source: SOURCE_NER.to_string(),
                text: text[f.start..f.end].to_string(),
                metadata: serde_json::Map::new(),
            });
        }
        Ok(entities)
    }
}
