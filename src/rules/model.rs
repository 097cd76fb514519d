//! Rule records and policy enumerations.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Action applied when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Mask,
    Block,
    Warn,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Mask => "mask",
            RuleAction::Block => "block",
            RuleAction::Warn => "warn",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(RuleAction::Allow),
            "mask" => Ok(RuleAction::Mask),
            "block" => Ok(RuleAction::Block),
            "warn" => Ok(RuleAction::Warn),
            other => Err(Error::Validation(format!("unknown rule action '{}'", other))),
        }
    }
}

/// Where a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Prompt,
    Chat,
    File,
    Api,
}

impl RuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleScope::Prompt => "prompt",
            RuleScope::Chat => "chat",
            RuleScope::File => "file",
            RuleScope::Api => "api",
        }
    }
}

impl FromStr for RuleScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prompt" => Ok(RuleScope::Prompt),
            "chat" => Ok(RuleScope::Chat),
            "file" => Ok(RuleScope::File),
            "api" => Ok(RuleScope::Api),
            other => Err(Error::Validation(format!("unknown rule scope '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Low => "low",
            RuleSeverity::Medium => "medium",
            RuleSeverity::High => "high",
        }
    }
}

impl FromStr for RuleSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(RuleSeverity::Low),
            "medium" => Ok(RuleSeverity::Medium),
            "high" => Ok(RuleSeverity::High),
            other => Err(Error::Validation(format!(
                "unknown rule severity '{}'",
                other
            ))),
        }
    }
}

/// Retrieval-augmented verification mode. The verification loop itself is
/// not part of this crate; the field is carried for the outer layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagMode {
    Off,
    Explain,
    Verify,
}

impl RagMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RagMode::Off => "off",
            RagMode::Explain => "explain",
            RagMode::Verify => "verify",
        }
    }
}

impl FromStr for RagMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(RagMode::Off),
            "explain" => Ok(RagMode::Explain),
            "verify" => Ok(RagMode::Verify),
            other => Err(Error::Validation(format!("unknown rag mode '{}'", other))),
        }
    }
}

/// A named, scoped, prioritized policy record.
///
/// `tenant_id = None` marks a global rule visible to every tenant;
/// `(tenant_id, stable_key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub stable_key: String,
    pub name: String,
    pub description: Option<String>,
    pub scope: RuleScope,
    /// Raw DSL tree as stored; the validated IR is built at load time.
    pub conditions: serde_json::Value,
    pub conditions_version: i64,
    pub action: RuleAction,
    pub severity: RuleSeverity,
    pub priority: i64,
    pub rag_mode: RagMode,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rule whose conditions evaluated to true for a given scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub stable_key: String,
    pub name: String,
    pub action: RuleAction,
    pub priority: i64,
}
