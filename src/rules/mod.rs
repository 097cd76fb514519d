//! Policy rules: records, the condition DSL, storage, seeding, evaluation.

pub mod dsl;
pub mod engine;
pub mod model;
pub mod seed;
pub mod store;

pub use dsl::{Condition, SignalOp};
pub use engine::RuleEngine;
pub use model::{RagMode, Rule, RuleAction, RuleMatch, RuleScope, RuleSeverity};
pub use seed::{RuleSeeder, SeedFile};
pub use store::{LoadedRule, NewRule, RuleStore};
