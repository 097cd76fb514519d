//! Promptgate configuration.
//!
//! Every section is serde-deserializable with full defaults, so an empty
//! file (or no file at all) yields a working configuration. Component
//! tuning structs live next to their components ([`NerConfig`],
//! [`MergeConfig`], [`AppendConfig`]); this module aggregates them.

use crate::conversation::appender::AppendConfig;
use crate::error::Result;
use crate::scan::merger::MergeConfig;
use crate::scan::ner::NerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scan pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Per-detector timeout. A detector that exceeds it contributes
    /// nothing to the scan (degraded mode).
    pub detector_timeout_ms: u64,

    /// NER detector settings.
    pub ner: NerConfig,

    /// Entity merger settings.
    pub merge: MergeConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detector_timeout_ms: 2_000,
            ner: NerConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Scan pipeline settings.
    pub scan: ScanConfig,

    /// Message append settings.
    pub append: AppendConfig,

    /// Optional path to the persona keyword YAML for the context scorer.
    pub personas_path: Option<String>,

    /// Optional path to the rule seed YAML.
    pub rule_seed_path: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
