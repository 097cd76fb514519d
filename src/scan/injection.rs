//! Prompt injection heuristics.
//!
//! A regex bank targeting common injection idioms (instruction override,
//! system-prompt extraction, guardrail bypass, secret exfiltration).
//! The detector produces a signal object, never entities: downstream rules
//! match on `security.*` fields rather than spans. Base64 blocks in the
//! input are decoded and run through the same bank so that trivially
//! encoded payloads do not slip past.

use crate::error::{Error, Result};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?previous\s+instructions",
    r"reveal\s+(the\s+)?system\s+prompt",
    r"bypass\s+(all\s+)?(policy|policies|guardrails|safety)",
    r"you\s+are\s+dan",
    r"act\s+as\s+an?\s+unrestricted",
    r"print\s+.*(api\s*key|secret|token|env)",
    r"show\s+hidden\s+(rules|policies)",
];

/// Three-way outcome of the injection scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjectionDecision {
    Allow,
    Review,
    Block,
}

impl InjectionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionDecision::Allow => "ALLOW",
            InjectionDecision::Review => "REVIEW",
            InjectionDecision::Block => "BLOCK",
        }
    }
}

/// Result of scanning input for injection idioms.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionResult {
    pub decision: InjectionDecision,
    pub score: f64,
    pub reason: String,
    pub prompt_injection: bool,
}

impl Default for InjectionResult {
    fn default() -> Self {
        Self::clean()
    }
}

impl InjectionResult {
    fn clean() -> Self {
        Self {
            decision: InjectionDecision::Allow,
            score: 0.0,
            reason: "No injection detected".to_string(),
            prompt_injection: false,
        }
    }

    /// The `security` signal sub-object consumed by the rule DSL.
    pub fn to_signal_value(&self) -> serde_json::Value {
        json!({
            "decision": self.decision.as_str(),
            "score": self.score,
            "reason": self.reason,
            "prompt_injection": self.prompt_injection,
            "prompt_injection_block": self.decision == InjectionDecision::Block,
            "prompt_injection_suspected": matches!(
                self.decision,
                InjectionDecision::Review | InjectionDecision::Block
            ),
        })
    }
}

/// Heuristic prompt-injection scanner. Compile once at startup and share.
#[derive(Debug)]
pub struct InjectionDetector {
    patterns: Vec<Regex>,
    base64_block: Regex,
    detect_encoded: bool,
}

impl InjectionDetector {
    pub fn new() -> Result<Self> {
        let patterns = INJECTION_PATTERNS
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| Error::Config(format!("invalid injection pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            base64_block: Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}")
                .map_err(|e| Error::Config(format!("invalid base64 pattern: {}", e)))?,
            detect_encoded: true,
        })
    }

    /// Scan input text. Each distinct pattern hit adds 0.3 to the score
    /// (clipped at 1.0); >= 0.6 blocks, >= 0.3 flags for review.
    pub fn scan(&self, text: &str) -> InjectionResult {
        let lower = text.to_lowercase();

        let mut hits = 0usize;
        for pattern in &self.patterns {
            if pattern.is_match(&lower) {
                hits += 1;
            }
        }

        // Decoded base64 payloads count against the same bank. The original
        // input is used here: base64 is case-sensitive.
        if self.detect_encoded {
            hits += self.encoded_hits(text);
        }

        if hits == 0 {
            return InjectionResult::clean();
        }

        let score = (0.3 * hits as f64).min(1.0);
        if score >= 0.6 {
            InjectionResult {
                decision: InjectionDecision::Block,
                score,
                reason: "High confidence prompt injection".to_string(),
                prompt_injection: true,
            }
        } else {
            InjectionResult {
                decision: InjectionDecision::Review,
                score,
                reason: "Suspicious injection pattern".to_string(),
                prompt_injection: false,
            }
        }
    }

    fn encoded_hits(&self, text: &str) -> usize {
        let mut hits = 0usize;
        for block in self.base64_block.find_iter(text) {
            let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(block.as_str())
            else {
                continue;
            };
            let Ok(decoded_text) = String::from_utf8(decoded) else {
                continue;
            };
            let decoded_lower = decoded_text.to_lowercase();
            for pattern in &self.patterns {
                if pattern.is_match(&decoded_lower) {
                    hits += 1;
                }
            }
        }
        hits
    }
}
