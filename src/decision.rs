//! Final-action resolution over rule matches.
//!
//! Ordering policy: any `block` wins, else any `mask`, else the
//! highest-priority remaining match; no matches means `allow`. Priority
//! ties break by rule load order, which the store keeps deterministic.

use crate::rules::model::{RuleAction, RuleMatch};
use serde::{Deserialize, Serialize};

/// Outcome of resolving a set of rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub final_action: RuleAction,
    pub matched: Vec<RuleMatch>,
    pub chosen: Option<RuleMatch>,
}

/// Selects a single final action from conflicting rule outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionResolver;

impl DecisionResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, matches: Vec<RuleMatch>) -> DecisionResult {
        if matches.is_empty() {
            return DecisionResult {
                final_action: RuleAction::Allow,
                matched: Vec::new(),
                chosen: None,
            };
        }

        // stable sort: equal priorities keep load order
        let mut sorted = matches;
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

        let chosen = sorted
            .iter()
            .find(|m| m.action == RuleAction::Block)
            .or_else(|| sorted.iter().find(|m| m.action == RuleAction::Mask))
            .or_else(|| sorted.first())
            .cloned();

        DecisionResult {
            final_action: chosen
                .as_ref()
                .map(|m| m.action)
                .unwrap_or(RuleAction::Allow),
            matched: sorted,
            chosen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn m(key: &str, action: RuleAction, priority: i64) -> RuleMatch {
        RuleMatch {
            rule_id: Uuid::new_v4(),
            stable_key: key.to_string(),
            name: key.to_string(),
            action,
            priority,
        }
    }

    fn resolver() -> DecisionResolver {
        DecisionResolver::new()
    }

    #[test]
    fn test_empty_matches_allow() {
        let result = resolver().resolve(Vec::new());
        assert_eq!(result.final_action, RuleAction::Allow);
        assert!(result.chosen.is_none());
        assert!(result.matched.is_empty());
    }

    #[test]
    fn test_block_dominates() {
        let result = resolver().resolve(vec![
            m("mask", RuleAction::Mask, 200),
            m("block", RuleAction::Block, 10),
            m("warn", RuleAction::Warn, 300),
        ]);
        assert_eq!(result.final_action, RuleAction::Block);
        assert_eq!(result.chosen.unwrap().stable_key, "block");
    }

    #[test]
    fn test_highest_priority_block_chosen() {
        let result = resolver().resolve(vec![
            m("b1", RuleAction::Block, 10),
            m("b2", RuleAction::Block, 90),
        ]);
        assert_eq!(result.chosen.unwrap().stable_key, "b2");
    }

    #[test]
    fn test_mask_beats_warn_and_allow() {
        let result = resolver().resolve(vec![
            m("warn", RuleAction::Warn, 500),
            m("mask", RuleAction::Mask, 1),
        ]);
        assert_eq!(result.final_action, RuleAction::Mask);
    }

    #[test]
    fn test_first_remaining_when_no_block_or_mask() {
        let result = resolver().resolve(vec![
            m("warn-low", RuleAction::Warn, 5),
            m("warn-high", RuleAction::Warn, 50),
        ]);
        assert_eq!(result.final_action, RuleAction::Warn);
        assert_eq!(result.chosen.unwrap().stable_key, "warn-high");
    }

    #[test]
    fn test_priority_tie_keeps_load_order() {
        let result = resolver().resolve(vec![
            m("first", RuleAction::Block, 100),
            m("second", RuleAction::Block, 100),
        ]);
        assert_eq!(result.chosen.unwrap().stable_key, "first");
    }

    #[test]
    fn test_matched_list_sorted_by_priority() {
        let result = resolver().resolve(vec![
            m("low", RuleAction::Warn, 1),
            m("high", RuleAction::Warn, 99),
        ]);
        let keys: Vec<&str> = result.matched.iter().map(|m| m.stable_key.as_str()).collect();
        assert_eq!(keys, vec!["high", "low"]);
    }
}
