//! The message append protocol.
//!
//! Appends are serialized per conversation by an advisory lock (a DashMap
//! of per-conversation mutexes), held across validate → scan → commit.
//! That is the whole point: a gap-free, strictly ordered log per
//! conversation, at the cost of contention latency. Across conversations
//! appends run freely in parallel.
//!
//! Ownership failures surface as `NotFound`, never `Forbidden`, so probing
//! for foreign conversation ids leaks nothing. A scan error between lock
//! and commit persists nothing and consumes no sequence number;
//! `PolicyBlocked` is raised only after the audit row is committed.

use crate::conversation::membership::MembershipResolver;
use crate::conversation::model::{
    Conversation, Message, MessageInputType, MessageRole, ScanStatus,
};
use crate::conversation::store::ConversationStore;
use crate::error::{Error, Result};
use crate::rules::model::RuleAction;
use crate::scan::engine::{ScanEngine, ScanResult};
use crate::scan::mask::MaskService;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Append behavior knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// When true, a masked message stores `content = NULL` like a blocked
    /// one (tenant policy); the default keeps the original alongside
    /// `content_masked`.
    pub null_content_on_mask: bool,
}

/// Appends user messages under the scan-and-decide pipeline.
pub struct ConversationAppender {
    store: Arc<ConversationStore>,
    scan: Arc<ScanEngine>,
    mask: MaskService,
    membership: Arc<dyn MembershipResolver>,
    /// Per-conversation advisory locks (DashMap for per-key locking)
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    config: AppendConfig,
}

impl ConversationAppender {
    pub fn new(
        store: Arc<ConversationStore>,
        scan: Arc<ScanEngine>,
        membership: Arc<dyn MembershipResolver>,
        config: AppendConfig,
    ) -> Self {
        Self {
            store,
            scan,
            mask: MaskService::new(),
            membership,
            locks: DashMap::new(),
            config,
        }
    }

    /// Create a personal conversation owned by `user_id`.
    pub async fn create_personal_conversation(
        &self,
        user_id: Uuid,
        title: Option<String>,
        model_name: Option<String>,
        temperature: Option<f64>,
    ) -> Result<Conversation> {
        let mut c = Conversation::new(user_id, None);
        c.title = title;
        c.model_name = model_name;
        c.temperature = temperature;
        self.store.insert_conversation(&c)?;
        Ok(c)
    }

    /// Create a tenant-scoped conversation. Requires active membership;
    /// this create path is the one place a membership denial surfaces as
    /// `Forbidden` rather than `NotFound`.
    pub async fn create_tenant_conversation(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        title: Option<String>,
        model_name: Option<String>,
        temperature: Option<f64>,
    ) -> Result<Conversation> {
        if !self.membership.is_active_member(user_id, tenant_id).await? {
            return Err(Error::Forbidden("Tenant membership required".to_string()));
        }
        let mut c = Conversation::new(user_id, Some(tenant_id));
        c.title = title;
        c.model_name = model_name;
        c.temperature = temperature;
        self.store.insert_conversation(&c)?;
        Ok(c)
    }

    /// Append one user message: lock, validate, scan, apply the final
    /// action, persist, and report the outcome.
    ///
    /// Returns the persisted message, or `PolicyBlocked` (after commit)
    /// when the scan decided to block.
    pub async fn append_user_message(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        content: &str,
        input_type: MessageInputType,
    ) -> Result<Message> {
        let lock = self.conversation_lock(conversation_id);
        let _guard = lock.lock().await;

        let conversation = self
            .store
            .get_conversation(conversation_id)?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
        self.authorize(&conversation, user_id).await?;

        let next_seq = conversation.last_sequence_number + 1;

        let scan = self.scan.scan(content, conversation.tenant_id).await?;
        let message = self.build_message(&conversation, next_seq, content, input_type, &scan)?;

        self.store.commit_append(&message)?;

        if message.blocked() {
            tracing::info!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                risk_score = scan.risk_score,
                "Message blocked by policy"
            );
            let rule = scan
                .matches
                .iter()
                .find(|m| m.action == RuleAction::Block)
                .map(|m| m.stable_key.clone());
            return Err(Error::PolicyBlocked {
                message_id: message.id,
                rule,
            });
        }

        Ok(message)
    }

    /// Messages of a conversation in sequence order, under the same
    /// ownership rules as appending.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Message>> {
        let conversation = self
            .store
            .get_conversation(conversation_id)?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
        self.authorize(&conversation, user_id).await?;
        self.store.list_messages(conversation_id)
    }

    fn conversation_lock(&self, conversation_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Personal conversations are owner-only; tenant conversations require
    /// active membership. Either failure reads as `NotFound`.
    async fn authorize(&self, conversation: &Conversation, user_id: Uuid) -> Result<()> {
        match conversation.tenant_id {
            None => {
                if conversation.owner_user_id != user_id {
                    return Err(Error::NotFound("Conversation not found".to_string()));
                }
            }
            Some(tenant_id) => {
                if !self.membership.is_active_member(user_id, tenant_id).await? {
                    return Err(Error::NotFound("Conversation not found".to_string()));
                }
            }
        }
        Ok(())
    }

    fn build_message(
        &self,
        conversation: &Conversation,
        sequence_number: i64,
        content: &str,
        input_type: MessageInputType,
        scan: &ScanResult,
    ) -> Result<Message> {
        let blocked = scan.final_action == RuleAction::Block;
        let masked = scan.final_action == RuleAction::Mask;

        let content_masked = if masked {
            Some(self.mask.mask(content, &scan.entities)?)
        } else {
            None
        };
        let stored_content = if blocked || (masked && self.config.null_content_on_mask) {
            None
        } else {
            Some(content.to_string())
        };

        let mut summary = serde_json::Map::new();
        summary.insert("entities".into(), serde_json::to_value(&scan.entities)?);
        summary.insert("signals".into(), scan.signals.to_value());
        summary.insert("matched_rules".into(), serde_json::to_value(&scan.matches)?);

        Ok(Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: MessageRole::User,
            sequence_number,
            input_type,
            content: stored_content,
            content_hash: sha256_hex(content),
            content_masked,
            scan_status: ScanStatus::Done,
            scan_version: 1,
            pre_rag_action: None,
            final_action: Some(scan.final_action),
            risk_score: Some(scan.risk_score),
            ambiguous: scan.ambiguous,
            matched_rule_ids: scan.matches.iter().map(|m| m.rule_id.to_string()).collect(),
            entities_json: Some(serde_json::Value::Object(summary)),
            rag_evidence_json: None,
            latency_ms: Some(scan.latency_ms),
            created_at: Utc::now(),
        })
    }
}

/// Hex SHA-256 of the original input, computed before any nulling/masking.
fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
