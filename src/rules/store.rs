//! SQLite-backed rule storage.
//!
//! `load(tenant_id)` returns every enabled rule visible to the tenant (its
//! own plus globals) ordered by `priority DESC, id ASC`; the secondary key
//! makes resolver tie-breaking fully deterministic. Conditions are parsed
//! into the typed IR as part of the load, so a malformed tree fails the
//! scan before any rule is evaluated.
//!
//! Loads are cached per tenant key in a process-wide read-mostly map; the
//! cache is invalidated on every rule write (the seed path is the only
//! writer in this crate).

use crate::error::{Error, Result};
use crate::rules::dsl::Condition;
use crate::rules::model::{RagMode, Rule, RuleAction, RuleScope, RuleSeverity};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

/// A rule with its conditions validated into the evaluable IR.
#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub rule: Rule,
    pub condition: Condition,
}

/// Input for a rule upsert (the seed path).
#[derive(Debug, Clone)]
pub struct NewRule {
    pub tenant_id: Option<Uuid>,
    pub stable_key: String,
    pub name: String,
    pub description: Option<String>,
    pub scope: RuleScope,
    pub conditions: serde_json::Value,
    pub conditions_version: i64,
    pub action: RuleAction,
    pub severity: RuleSeverity,
    pub priority: i64,
    pub rag_mode: RagMode,
    pub enabled: bool,
}

/// SQLite rule store with a per-tenant load cache.
pub struct RuleStore {
    conn: Arc<Mutex<Connection>>,
    cache: RwLock<HashMap<Option<Uuid>, Arc<Vec<LoadedRule>>>>,
}

impl RuleStore {
    /// Open (or create) a rule database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rules (
                id                 TEXT PRIMARY KEY,
                tenant_id          TEXT,
                stable_key         TEXT NOT NULL,
                name               TEXT NOT NULL,
                description        TEXT,
                scope              TEXT NOT NULL,
                conditions         TEXT NOT NULL,
                conditions_version INTEGER NOT NULL DEFAULT 1,
                action             TEXT NOT NULL,
                severity           TEXT NOT NULL,
                priority           INTEGER NOT NULL DEFAULT 0,
                rag_mode           TEXT NOT NULL,
                enabled            INTEGER NOT NULL DEFAULT 1,
                created_at         TEXT NOT NULL,
                updated_at         TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS uq_rules_tenant_key
                ON rules (COALESCE(tenant_id, ''), stable_key);
            CREATE INDEX IF NOT EXISTS ix_rules_enabled_priority
                ON rules (enabled, priority);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("rule store lock poisoned".to_string()))
    }

    /// All enabled rules visible to a tenant, ordered `priority DESC, id ASC`,
    /// with conditions validated into the IR. Cached per tenant key.
    pub fn load(&self, tenant_id: Option<Uuid>) -> Result<Arc<Vec<LoadedRule>>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(rules) = cache.get(&tenant_id) {
                return Ok(rules.clone());
            }
        }

        let rows = {
            let conn = self.conn()?;
            let sql = "SELECT id, tenant_id, stable_key, name, description, scope, conditions,
                              conditions_version, action, severity, priority, rag_mode, enabled,
                              created_at, updated_at
                       FROM rules
                       WHERE enabled = 1 AND (tenant_id = ?1 OR tenant_id IS NULL)
                       ORDER BY priority DESC, id ASC";
            let mut stmt = conn.prepare(sql)?;
            let mapped = stmt.query_map(params![tenant_id.map(|t| t.to_string())], rule_from_row)?;
            mapped.collect::<rusqlite::Result<Vec<Rule>>>()?
        };

        let mut loaded = Vec::with_capacity(rows.len());
        for rule in rows {
            let condition = Condition::parse(&rule.stable_key, &rule.conditions)?;
            loaded.push(LoadedRule { rule, condition });
        }
        let loaded = Arc::new(loaded);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(tenant_id, loaded.clone());
        }
        Ok(loaded)
    }

    /// Insert or update a rule keyed by `(tenant_id IS NULL, stable_key)`.
    ///
    /// The conditions tree is stored as given; validation happens at load.
    /// Every write invalidates the load cache.
    pub fn upsert(&self, rule: NewRule) -> Result<Uuid> {
        let now = Utc::now().to_rfc3339();
        let conditions = serde_json::to_string(&rule.conditions)?;
        let tenant = rule.tenant_id.map(|t| t.to_string());

        let id = {
            let conn = self.conn()?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM rules WHERE tenant_id IS ?1 AND stable_key = ?2",
                    params![tenant, rule.stable_key],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE rules SET name = ?1, description = ?2, scope = ?3,
                                conditions = ?4, conditions_version = ?5, action = ?6,
                                severity = ?7, priority = ?8, rag_mode = ?9, enabled = ?10,
                                updated_at = ?11
                         WHERE id = ?12",
                        params![
                            rule.name,
                            rule.description,
                            rule.scope.as_str(),
                            conditions,
                            rule.conditions_version,
                            rule.action.as_str(),
                            rule.severity.as_str(),
                            rule.priority,
                            rule.rag_mode.as_str(),
                            rule.enabled as i64,
                            now,
                            id,
                        ],
                    )?;
                    Uuid::parse_str(&id)
                        .map_err(|e| Error::Internal(format!("corrupt rule id: {}", e)))?
                }
                None => {
                    let id = Uuid::new_v4();
                    conn.execute(
                        "INSERT INTO rules (id, tenant_id, stable_key, name, description, scope,
                                conditions, conditions_version, action, severity, priority,
                                rag_mode, enabled, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                        params![
                            id.to_string(),
                            tenant,
                            rule.stable_key,
                            rule.name,
                            rule.description,
                            rule.scope.as_str(),
                            conditions,
                            rule.conditions_version,
                            rule.action.as_str(),
                            rule.severity.as_str(),
                            rule.priority,
                            rule.rag_mode.as_str(),
                            rule.enabled as i64,
                            now,
                            now,
                        ],
                    )
                    .map_err(conflict_on_unique)?;
                    id
                }
            }
        };

        self.invalidate();
        Ok(id)
    }

    /// Drop all cached loads. Called on every rule write.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

fn conflict_on_unique(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("rule violates a unique constraint: {}", e))
        }
        _ => Error::Storage(e),
    }
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let id: String = row.get(0)?;
    let tenant_id: Option<String> = row.get(1)?;
    let scope: String = row.get(5)?;
    let conditions: String = row.get(6)?;
    let action: String = row.get(8)?;
    let severity: String = row.get(9)?;
    let rag_mode: String = row.get(11)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Rule {
        id: parse_uuid(&id, 0)?,
        tenant_id: match tenant_id {
            Some(t) => Some(parse_uuid(&t, 1)?),
            None => None,
        },
        stable_key: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        scope: parse_text(&scope, 5)?,
        conditions: serde_json::from_str(&conditions).map_err(|e| text_error(6, e))?,
        conditions_version: row.get(7)?,
        action: parse_text(&action, 8)?,
        severity: parse_text(&severity, 9)?,
        priority: row.get(10)?,
        rag_mode: parse_text(&rag_mode, 11)?,
        enabled: row.get::<_, i64>(12)? != 0,
        created_at: parse_timestamp(&created_at, 13)?,
        updated_at: parse_timestamp(&updated_at, 14)?,
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
