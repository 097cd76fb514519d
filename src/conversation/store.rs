//! SQLite conversation and message persistence.
//!
//! The append protocol's critical section is [`ConversationStore::commit_append`]:
//! one transaction bumps the conversation sequence and inserts the message
//! row, so a failure anywhere rolls back both and the log stays gap-free.
//! The sequence bump is guarded (`WHERE last_sequence_number = expected`),
//! so even a writer that bypassed the advisory lock cannot create
//! duplicate sequence numbers.

use crate::conversation::model::{Conversation, Message};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id                   TEXT PRIMARY KEY,
                owner_user_id        TEXT NOT NULL,
                tenant_id            TEXT,
                title                TEXT,
                model_name           TEXT,
                temperature          REAL,
                last_sequence_number INTEGER NOT NULL DEFAULT 0,
                status               TEXT NOT NULL DEFAULT 'active',
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id                TEXT PRIMARY KEY,
                conversation_id   TEXT NOT NULL REFERENCES conversations(id),
                role              TEXT NOT NULL,
                sequence_number   INTEGER NOT NULL,
                input_type        TEXT NOT NULL,
                content           TEXT,
                content_hash      TEXT NOT NULL,
                content_masked    TEXT,
                scan_status       TEXT NOT NULL,
                scan_version      INTEGER NOT NULL DEFAULT 1,
                pre_rag_action    TEXT,
                final_action      TEXT,
                risk_score        REAL,
                ambiguous         INTEGER NOT NULL DEFAULT 0,
                matched_rule_ids  TEXT NOT NULL DEFAULT '[]',
                entities_json     TEXT,
                rag_evidence_json TEXT,
                latency_ms        INTEGER,
                created_at        TEXT NOT NULL,
                UNIQUE (conversation_id, sequence_number)
            );
            CREATE INDEX IF NOT EXISTS ix_messages_conversation_created
                ON messages (conversation_id, created_at);
            CREATE INDEX IF NOT EXISTS ix_messages_content_hash
                ON messages (content_hash);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("conversation store lock poisoned".to_string()))
    }

    pub fn insert_conversation(&self, c: &Conversation) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO conversations (id, owner_user_id, tenant_id, title, model_name,
                    temperature, last_sequence_number, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                c.id.to_string(),
                c.owner_user_id.to_string(),
                c.tenant_id.map(|t| t.to_string()),
                c.title,
                c.model_name,
                c.temperature,
                c.last_sequence_number,
                c.status.as_str(),
                c.created_at.to_rfc3339(),
                c.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_user_id, tenant_id, title, model_name, temperature,
                    last_sequence_number, status, created_at, updated_at
             FROM conversations WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id.to_string()], conversation_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Commit one append atomically: bump the conversation sequence to
    /// `message.sequence_number` and insert the message row. Fails with
    /// `Conflict` if another writer got there first.
    pub fn commit_append(&self, message: &Message) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let expected_previous = message.sequence_number - 1;
        let updated = tx.execute(
            "UPDATE conversations
             SET last_sequence_number = ?1, updated_at = ?2
             WHERE id = ?3 AND last_sequence_number = ?4",
            params![
                message.sequence_number,
                Utc::now().to_rfc3339(),
                message.conversation_id.to_string(),
                expected_previous,
            ],
        )?;
        if updated != 1 {
            return Err(Error::Conflict(format!(
                "conversation {} sequence advanced concurrently",
                message.conversation_id
            )));
        }

        tx.execute(
            "INSERT INTO messages (id, conversation_id, role, sequence_number, input_type,
                    content, content_hash, content_masked, scan_status, scan_version,
                    pre_rag_action, final_action, risk_score, ambiguous, matched_rule_ids,
                    entities_json, rag_evidence_json, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.role.as_str(),
                message.sequence_number,
                message.input_type.as_str(),
                message.content,
                message.content_hash,
                message.content_masked,
                message.scan_status.as_str(),
                message.scan_version,
                message.pre_rag_action.map(|a| a.as_str()),
                message.final_action.map(|a| a.as_str()),
                message.risk_score,
                message.ambiguous as i64,
                serde_json::to_string(&message.matched_rule_ids)?,
                message
                    .entities_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message
                    .rag_evidence_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message.latency_ms,
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(conflict_on_unique)?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id = ?1",
            MESSAGE_SELECT
        ))?;
        let mut rows = stmt.query_map(params![id.to_string()], message_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All messages of a conversation in sequence order.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE conversation_id = ?1 ORDER BY sequence_number ASC",
            MESSAGE_SELECT
        ))?;
        let rows = stmt.query_map(params![conversation_id.to_string()], message_from_row)?;
        rows.collect::<rusqlite::Result<Vec<Message>>>()
            .map_err(Error::from)
    }
}

const MESSAGE_SELECT: &str =
    "SELECT id, conversation_id, role, sequence_number, input_type, content, content_hash,
            content_masked, scan_status, scan_version, pre_rag_action, final_action,
            risk_score, ambiguous, matched_rule_ids, entities_json, rag_evidence_json,
            latency_ms, created_at
     FROM messages";

fn conflict_on_unique(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("message violates a unique constraint: {}", e))
        }
        _ => Error::Storage(e),
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let tenant: Option<String> = row.get(2)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Conversation {
        id: parse_uuid(&id, 0)?,
        owner_user_id: parse_uuid(&owner, 1)?,
        tenant_id: match tenant {
            Some(t) => Some(parse_uuid(&t, 2)?),
            None => None,
        },
        title: row.get(3)?,
        model_name: row.get(4)?,
        temperature: row.get(5)?,
        last_sequence_number: row.get(6)?,
        status: parse_text(&status, 7)?,
        created_at: parse_timestamp(&created_at, 8)?,
        updated_at: parse_timestamp(&updated_at, 9)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let input_type: String = row.get(4)?;
    let scan_status: String = row.get(8)?;
    let pre_rag: Option<String> = row.get(10)?;
    let final_action: Option<String> = row.get(11)?;
    let matched_rule_ids: String = row.get(14)?;
    let entities_json: Option<String> = row.get(15)?;
    let rag_evidence_json: Option<String> = row.get(16)?;
    let created_at: String = row.get(18)?;

    Ok(Message {
        id: parse_uuid(&id, 0)?,
        conversation_id: parse_uuid(&conversation_id, 1)?,
        role: parse_text(&role, 2)?,
        sequence_number: row.get(3)?,
        input_type: parse_text(&input_type, 4)?,
        content: row.get(5)?,
        content_hash: row.get(6)?,
        content_masked: row.get(7)?,
        scan_status: parse_text(&scan_status, 8)?,
        scan_version: row.get(9)?,
        pre_rag_action: match pre_rag {
            Some(a) => Some(parse_text(&a, 10)?),
            None => None,
        },
        final_action: match final_action {
            Some(a) => Some(parse_text(&a, 11)?),
            None => None,
        },
        risk_score: row.get(12)?,
        ambiguous: row.get::<_, i64>(13)? != 0,
        matched_rule_ids: serde_json::from_str(&matched_rule_ids)
            .map_err(|e| text_error(14, e))?,
        entities_json: match entities_json {
            Some(j) => Some(serde_json::from_str(&j).map_err(|e| text_error(15, e))?),
            None => None,
        },
        rag_evidence_json: match rag_evidence_json {
            Some(j) => Some(serde_json::from_str(&j).map_err(|e| text_error(16, e))?),
            None => None,
        },
        latency_ms: row.get(17)?,
        created_at: parse_timestamp(&created_at, 18)?,
    })
}

fn parse_uuid(s: &str, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| text_error(idx, e))
}

fn parse_text<T: std::str::FromStr>(s: &str, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.parse::<T>().map_err(|e| text_error(idx, e))
}

fn parse_timestamp(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| text_error(idx, e))
}

fn text_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}
