//! Entity reconciliation across detectors.
//!
//! Detectors emit duplicate findings (the same phone number caught by both
//! regex and NER). The merger sorts candidates by `(start asc, end desc,
//! score desc)` and sweeps once, comparing each candidate to the last kept
//! entity: when both carry the same canonical type and the overlap ratio
//! `inter / min(len_a, len_b)` reaches the threshold, only the better
//! candidate survives. Output order is deterministic regardless of
//! detector scheduling. Entities of different types are never merged, even
//! at identical spans; masking's overlap check is the safety net for that
//! case.

use crate::scan::entity::Entity;
use serde::{Deserialize, Serialize};

/// Merger tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Minimum `inter / min(len_a, len_b)` ratio for two entities to be
    /// considered duplicates.
    pub overlap_threshold: f64,
    /// On score ties, the earlier source in this list wins.
    pub prefer_source_order: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.80,
            prefer_source_order: vec!["local_regex".to_string(), "ner".to_string()],
        }
    }
}

/// Deduplicates overlapping entities from multiple detectors.
#[derive(Debug, Clone, Default)]
pub struct EntityMerger {
    config: MergeConfig,
}

impl EntityMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge a concatenated entity list, collapsing same-type duplicates.
    pub fn merge(&self, entities: Vec<Entity>) -> Vec<Entity> {
        let mut items = entities;
        if items.is_empty() {
            return items;
        }

        items.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(b.end.cmp(&a.end))
                .then(b.score.total_cmp(&a.score))
        });

        let mut merged: Vec<Entity> = Vec::with_capacity(items.len());
        for e in items {
            if let Some(last) = merged.last() {
                let same_type =
                    e.entity_type == last.entity_type && !e.entity_type.is_empty();
                let ratio = overlap_ratio(e.start, e.end, last.start, last.end);
                if same_type && ratio >= self.config.overlap_threshold {
                    let replace = e.score > last.score
                        || (e.score == last.score
                            && self.source_rank(&e.source) < self.source_rank(&last.source));
                    if replace {
                        let i = merged.len() - 1;
                        merged[i] = e;
                    }
                    continue;
                }
            }
            merged.push(e);
        }

        merged
    }

    fn source_rank(&self, source: &str) -> usize {
        self.config
            .prefer_source_order
            .iter()
            .position(|s| s == source)
            .unwrap_or(usize::MAX)
    }
}

/// Overlap relative to the shorter of the two spans.
fn overlap_ratio(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> f64 {
    let inter = a_end.min(b_end).saturating_sub(a_start.max(b_start));
    if inter == 0 {
        return 0.0;
    }
    let len_a = (a_end - a_start).max(1);
    let len_b = (b_end - b_start).max(1);
    inter as f64 / len_a.min(len_b) as f64
}
