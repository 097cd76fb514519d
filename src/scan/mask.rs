//! Span masking.
//!
//! Rewrites input text by substituting each entity span with a `[TYPE]`
//! token, splicing right-to-left so earlier offsets stay valid. The entity
//! list must be overlap-free: the merger collapses same-type duplicates,
//! and any overlap that survives it (two types claiming the same span)
//! aborts the mask instead of silently corrupting the output.

use crate::error::{Error, Result};
use crate::scan::entity::Entity;

/// Rewrites text by substituting entity spans with type tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskService;

impl MaskService {
    pub fn new() -> Self {
        Self
    }

    /// Mask all entity spans in `text`.
    pub fn mask(&self, text: &str, entities: &[Entity]) -> Result<String> {
        if entities.is_empty() {
            return Ok(text.to_string());
        }

        let mut sorted: Vec<&Entity> = entities.iter().collect();
        sorted.sort_by(|a, b| b.start.cmp(&a.start));

        let mut masked = text.to_string();
        // everything at or beyond this byte has already been rewritten
        let mut right_boundary = usize::MAX;

        for e in sorted {
            if !e.span_valid_for(text) {
                return Err(Error::Internal(format!(
                    "entity span {}..{} out of bounds for input of {} bytes",
                    e.start,
                    e.end,
                    text.len()
                )));
            }
            if e.end > right_boundary {
                return Err(Error::MaskOverlap { at: e.start });
            }
            let token = format!("[{}]", e.entity_type);
            masked.replace_range(e.start..e.end, &token);
            right_boundary = e.start;
        }

        Ok(masked)
    }
}
