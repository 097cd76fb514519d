//! Promptgate - policy enforcement gateway for LLM chat messages
//!
//! Every user message bound for a model passes through one synchronous
//! scan-and-decide call before it is persisted and forwarded: detectors
//! find sensitive entities and adversarial signals, a JSON rule DSL is
//! evaluated against them, a single final action is resolved, and the
//! outcome is committed to an ordered conversation log.
//!
//! ```text
//! append_user_message(conversation, user, content)
//!         │  advisory per-conversation lock
//!         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ScanEngine                          │
//! │  RegexDetector ─┐                                         │
//! │  NerDetector   ─┼─► TypeNormalizer ─► EntityMerger ─┐     │
//! │  InjectionDet. ─┼──────────────► signals ───────────┼─►   │
//! │  ContextScorer ─┘                                   │     │
//! │        RuleStore ─► RuleEngine ─► DecisionResolver ◄┘     │
//! └──────────────────────────────────────────────────────────┘
//!         │  allow / warn / mask / block
//!         ▼
//! MaskService (conditional) ─► one SQLite transaction:
//!     sequence += 1, insert message row (hash, entities, outcome)
//! ```
//!
//! ## Guarantees
//!
//! - **Gap-free ordering**: per conversation, sequence numbers are dense
//!   and match commit order, even under concurrent writers.
//! - **Audit before refusal**: a blocked message is persisted (with null
//!   content but the original's SHA-256) before `PolicyBlocked` is raised.
//! - **Degraded scanning**: a failing or slow detector contributes
//!   nothing; a malformed rule fails the scan and nothing is persisted.
//!
//! ## Modules
//!
//! - [`scan`]: detectors, entity merging, the scan orchestrator, masking
//! - [`rules`]: rule records, the condition DSL, SQLite store, YAML seeding
//! - [`decision`]: final-action resolution
//! - [`conversation`]: the message log and the append protocol
//! - [`config`]: serde/YAML configuration
//! - [`error`]: error taxonomy and the response envelope

pub mod config;
pub mod conversation;
pub mod decision;
pub mod error;
pub mod rules;
pub mod scan;

pub use config::{GatewayConfig, ScanConfig};
pub use conversation::{
    AppendConfig, Conversation, ConversationAppender, ConversationStore, MembershipResolver,
    Message, MessageInputType, StaticMembership,
};
pub use decision::{DecisionResolver, DecisionResult};
pub use error::{ApiResponse, Error, ErrorBody, ErrorDetail, Meta, Result};
pub use rules::{
    Rule, RuleAction, RuleEngine, RuleMatch, RuleSeeder, RuleStore,
};
pub use scan::{
    ContextScorer, Entity, InjectionDetector, MaskService, NerAnalyzer, NerFinding,
    RegexDetector, ScanEngine, ScanResult, Signals,
};
