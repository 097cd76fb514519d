//! Conversation and message records.

use crate::error::Error;
use crate::rules::model::RuleAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "archived" => Ok(ConversationStatus::Archived),
            other => Err(Error::Validation(format!(
                "unknown conversation status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(Error::Validation(format!(
                "unknown message role '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageInputType {
    UserInput,
    SystemPrompt,
    ToolResult,
}

impl MessageInputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageInputType::UserInput => "user_input",
            MessageInputType::SystemPrompt => "system_prompt",
            MessageInputType::ToolResult => "tool_result",
        }
    }
}

impl FromStr for MessageInputType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "user_input" => Ok(MessageInputType::UserInput),
            "system_prompt" => Ok(MessageInputType::SystemPrompt),
            "tool_result" => Ok(MessageInputType::ToolResult),
            other => Err(Error::Validation(format!(
                "unknown input type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Done,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Done => "done",
            ScanStatus::Failed => "failed",
        }
    }
}

impl FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "done" => Ok(ScanStatus::Done),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(Error::Validation(format!(
                "unknown scan status '{}'",
                other
            ))),
        }
    }
}

/// An ordered, append-only log of messages.
///
/// `tenant_id = None` marks a personal conversation (owner-only access);
/// otherwise access requires active tenant membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub title: Option<String>,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    /// Monotonic, gap-free sequence of the last committed message.
    pub last_sequence_number: i64,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(owner_user_id: Uuid, tenant_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_user_id,
            tenant_id,
            title: None,
            model_name: None,
            temperature: None,
            last_sequence_number: 0,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One persisted message with its scan outcome.
///
/// `content` is null when the message was blocked; `content_hash` is always
/// the SHA-256 of the original input, so audit integrity survives nulling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub sequence_number: i64,
    pub input_type: MessageInputType,
    pub content: Option<String>,
    pub content_hash: String,
    pub content_masked: Option<String>,
    pub scan_status: ScanStatus,
    pub scan_version: i64,
    pub pre_rag_action: Option<RuleAction>,
    pub final_action: Option<RuleAction>,
    pub risk_score: Option<f64>,
    pub ambiguous: bool,
    pub matched_rule_ids: Vec<String>,
    pub entities_json: Option<serde_json::Value>,
    pub rag_evidence_json: Option<serde_json::Value>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Derived flag: was this message blocked by policy?
    pub fn blocked(&self) -> bool {
        matches!(self.final_action, Some(RuleAction::Block))
    }
}
