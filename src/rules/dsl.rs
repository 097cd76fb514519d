//! Rule condition DSL.
//!
//! Conditions are stored as JSON trees and validated once, at rule load,
//! into the typed [`Condition`] IR; evaluation is then pure and cannot
//! fail. Node shapes:
//!
//! | shape | semantics |
//! |---|---|
//! | `{"any": [..]}` | short-circuit OR (empty ⇒ false) |
//! | `{"all": [..]}` | short-circuit AND (empty ⇒ true) |
//! | `{"not": C}` | negation |
//! | `{"entity_type": T, "min_score"?: s, "source"?: src}` | entity existence |
//! | `{"signal": {"field": F, "equals"/"in"/"contains": V}}` | signal test |
//!
//! Anything else is rejected with `RuleMalformed`.

use crate::error::{Error, Result};
use crate::scan::entity::Entity;
use crate::scan::signals::Signals;
use serde_json::Value;

/// Validated condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Any(Vec<Condition>),
    All(Vec<Condition>),
    Not(Box<Condition>),
    EntityType {
        entity_type: String,
        min_score: f64,
        source: Option<String>,
    },
    Signal {
        field: String,
        op: SignalOp,
    },
}

/// Operator of a signal leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOp {
    Equals(Value),
    In(Vec<Value>),
    Contains(Value),
}

impl Condition {
    /// Parse and validate a JSON conditions tree. `rule` names the rule in
    /// error messages (its stable key).
    pub fn parse(rule: &str, node: &Value) -> Result<Condition> {
        let obj = node.as_object().ok_or_else(|| malformed(rule, "condition node must be an object"))?;

        if let Some(children) = obj.get("any") {
            let children = children
                .as_array()
                .ok_or_else(|| malformed(rule, "'any' expects a list"))?;
            return children
                .iter()
                .map(|c| Condition::parse(rule, c))
                .collect::<Result<Vec<_>>>()
                .map(Condition::Any);
        }

        if let Some(children) = obj.get("all") {
            let children = children
                .as_array()
                .ok_or_else(|| malformed(rule, "'all' expects a list"))?;
            return children
                .iter()
                .map(|c| Condition::parse(rule, c))
                .collect::<Result<Vec<_>>>()
                .map(Condition::All);
        }

        if let Some(child) = obj.get("not") {
            return Ok(Condition::Not(Box::new(Condition::parse(rule, child)?)));
        }

        if let Some(entity_type) = obj.get("entity_type") {
            let entity_type = entity_type
                .as_str()
                .ok_or_else(|| malformed(rule, "'entity_type' expects a string"))?
                .to_string();
            let min_score = match obj.get("min_score") {
                None => 0.0,
                Some(v) => v
                    .as_f64()
                    .ok_or_else(|| malformed(rule, "'min_score' expects a number"))?,
            };
            let source = match obj.get("source") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    v.as_str()
                        .ok_or_else(|| malformed(rule, "'source' expects a string"))?
                        .to_string(),
                ),
            };
            return Ok(Condition::EntityType {
                entity_type,
                min_score,
                source,
            });
        }

        if let Some(signal) = obj.get("signal") {
            let signal = signal
                .as_object()
                .ok_or_else(|| malformed(rule, "'signal' expects an object"))?;
            let field = signal
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(rule, "signal node missing string 'field'"))?
                .to_string();

            let op = if let Some(v) = signal.get("equals") {
                SignalOp::Equals(v.clone())
            } else if let Some(v) = signal.get("in") {
                let list = v
                    .as_array()
                    .ok_or_else(|| malformed(rule, "'in' expects a list"))?;
                SignalOp::In(list.clone())
            } else if let Some(v) = signal.get("contains") {
                SignalOp::Contains(v.clone())
            } else {
                let ops: Vec<&String> = signal.keys().filter(|k| k.as_str() != "field").collect();
                return Err(malformed(
                    rule,
                    &format!("unsupported signal operator {:?}", ops),
                ));
            };

            return Ok(Condition::Signal { field, op });
        }

        Err(malformed(
            rule,
            &format!("unsupported condition node: {}", node),
        ))
    }

    /// Evaluate against a scan's entities and signals.
    pub fn evaluate(&self, entities: &[Entity], signals: &Signals) -> bool {
        match self {
            Condition::Any(children) => children.iter().any(|c| c.evaluate(entities, signals)),
            Condition::All(children) => children.iter().all(|c| c.evaluate(entities, signals)),
            Condition::Not(child) => !child.evaluate(entities, signals),
            Condition::EntityType {
                entity_type,
                min_score,
                source,
            } => entities.iter().any(|e| {
                e.entity_type == *entity_type
                    && e.score >= *min_score
                    && source.as_ref().map_or(true, |s| e.source == *s)
            }),
            Condition::Signal { field, op } => {
                let value = signals.get(field).unwrap_or(&Value::Null);
                match op {
                    SignalOp::Equals(expected) => value == expected,
                    SignalOp::In(list) => list.contains(value),
                    SignalOp::Contains(needle) => match value {
                        Value::Array(items) => items.contains(needle),
                        Value::String(s) => {
                            needle.as_str().map_or(false, |n| s.contains(n))
                        }
                        _ => false,
                    },
                }
            }
        }
    }
}

fn malformed(rule: &str, reason: &str) -> Error {
    Error::RuleMalformed {
        rule: rule.to_string(),
        reason: reason.to_string(),
    }
}
