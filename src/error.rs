//! Promptgate error types and the caller-facing response envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Promptgate error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource missing, or access denied in a way that must not leak existence
    #[error("Not found: {0}")]
    NotFound(String),

    /// Membership-level denial on create paths
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unique-key violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A rule's conditions tree does not conform to the DSL
    #[error("Malformed rule '{rule}': {reason}")]
    RuleMalformed { rule: String, reason: String },

    /// Unrecoverable scan failure (detector panic, engine error)
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// Masking received overlapping entity spans
    #[error("Masking produced overlapping spans at byte {at}")]
    MaskOverlap { at: usize },

    /// Scan completed with `final_action = block`; the audit row is already
    /// committed when this is raised.
    #[error("Message blocked by policy (message {message_id})")]
    PolicyBlocked {
        message_id: Uuid,
        rule: Option<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite storage error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable string identifier surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Conflict(_) => "CONFLICT",
            Error::Config(_) | Error::Validation(_) => "VALIDATION_ERROR",
            Error::RuleMalformed { .. } => "RULE_MALFORMED",
            Error::PolicyBlocked { .. } => "POLICY_BLOCK",
            _ => "INTERNAL_ERROR",
        }
    }

    /// HTTP-ish status for the (out-of-scope) transport layer.
    pub fn status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Forbidden(_) | Error::PolicyBlocked { .. } => 403,
            Error::Unauthorized(_) => 401,
            Error::Conflict(_) => 409,
            Error::Config(_) | Error::Validation(_) => 422,
            _ => 500,
        }
    }
}

/// Result type alias for promptgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level detail attached to an error response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Error body of the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

/// Envelope metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Structured envelope returned to callers: `{ ok, data?, error?, meta }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub meta: Meta,
}

impl<T> ApiResponse<T> {
    /// Successful envelope.
    pub fn ok(data: T, request_id: Option<String>) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            meta: Meta { request_id },
        }
    }

    /// Failure envelope with an explicit code and message.
    pub fn fail(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Vec<ErrorDetail>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
                details,
            }),
            meta: Meta { request_id },
        }
    }

    /// Failure envelope derived from an [`Error`].
    pub fn from_error(err: &Error, request_id: Option<String>) -> Self {
        Self::fail(err.code(), err.to_string(), Vec::new(), request_id)
    }
}
