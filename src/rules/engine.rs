//! Rule evaluation.
//!
//! Walks the loaded (already validated) rules in store order and returns a
//! [`RuleMatch`] for every rule whose condition tree holds against the
//! scan's entities and signals. Order is preserved: the store loads by
//! `priority DESC, id ASC`, and the resolver relies on that.

use crate::rules::model::RuleMatch;
use crate::rules::store::LoadedRule;
use crate::scan::entity::Entity;
use crate::scan::signals::Signals;

/// Interprets rule conditions against scan output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        rules: &[LoadedRule],
        entities: &[Entity],
        signals: &Signals,
    ) -> Vec<RuleMatch> {
        let mut matches = Vec::new();
        for loaded in rules {
            if loaded.condition.evaluate(entities, signals) {
                tracing::debug!(
                    rule = %loaded.rule.stable_key,
                    action = %loaded.rule.action,
                    "Rule matched"
                );
                matches.push(RuleMatch {
                    rule_id: loaded.rule.id,
                    stable_key: loaded.rule.stable_key.clone(),
                    name: loaded.rule.name.clone(),
                    action: loaded.rule.action,
                    priority: loaded.rule.priority,
                });
            }
        }
        matches
    }
}
