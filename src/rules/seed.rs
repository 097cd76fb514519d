//! Rule seeding from a YAML file.
//!
//! The seed file carries a `defaults` block and a list of rules; omitted
//! per-rule fields fall back to the defaults. Upserts are keyed by
//! `(tenant IS NULL, stable_key)`, so re-running the seed is idempotent
//! and updates in place. Every conditions tree is validated before any
//! write, so a malformed seed never reaches the store.

use crate::error::{Error, Result};
use crate::rules::dsl::Condition;
use crate::rules::model::{RagMode, RuleAction, RuleScope, RuleSeverity};
use crate::rules::store::{NewRule, RuleStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SeedDefaults {
    pub scope: Option<RuleScope>,
    pub severity: Option<RuleSeverity>,
    pub priority: Option<i64>,
    pub rag_mode: Option<RagMode>,
    pub enabled: Option<bool>,
    pub conditions_version: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRule {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: Option<RuleScope>,
    pub action: RuleAction,
    #[serde(default)]
    pub severity: Option<RuleSeverity>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub rag_mode: Option<RagMode>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub conditions_version: Option<i64>,
    pub conditions: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub defaults: SeedDefaults,
    #[serde(default)]
    pub rules: Vec<SeedRule>,
}

/// Loads a YAML seed file and upserts its rules as global rules.
pub struct RuleSeeder {
    path: PathBuf,
}

impl RuleSeeder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<SeedFile> {
        let content = std::fs::read_to_string(&self.path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<SeedFile> {
        let file: SeedFile = serde_yaml::from_str(content)?;
        if file.rules.is_empty() {
            return Err(Error::Validation(
                "seed file contains no rules".to_string(),
            ));
        }
        Ok(file)
    }

    /// Upsert every seed rule into the store as a global rule. Returns the
    /// number of rules processed. The store's load cache is invalidated by
    /// each write.
    pub fn apply(&self, store: &RuleStore) -> Result<usize> {
        let file = self.load()?;
        Self::apply_parsed(file, store)
    }

    pub fn apply_parsed(file: SeedFile, store: &RuleStore) -> Result<usize> {
        let defaults = file.defaults;
        let mut processed = 0usize;

        for seed in file.rules {
            // reject malformed trees before anything is written
            Condition::parse(&seed.key, &seed.conditions)?;

            store.upsert(NewRule {
                tenant_id: None,
                stable_key: seed.key.clone(),
                name: seed.name,
                description: seed.description,
                scope: seed.scope.or(defaults.scope).unwrap_or(RuleScope::Prompt),
                conditions: seed.conditions,
                conditions_version: seed
                    .conditions_version
                    .or(defaults.conditions_version)
                    .unwrap_or(1),
                action: seed.action,
                severity: seed
                    .severity
                    .or(defaults.severity)
                    .unwrap_or(RuleSeverity::Medium),
                priority: seed.priority.or(defaults.priority).unwrap_or(0),
                rag_mode: seed.rag_mode.or(defaults.rag_mode).unwrap_or(RagMode::Off),
                enabled: seed.enabled.or(defaults.enabled).unwrap_or(true),
            })?;
            processed += 1;
        }

        tracing::info!(count = processed, "Seeded global rules");
        Ok(processed)
    }
}
