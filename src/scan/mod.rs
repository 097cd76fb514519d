//! The scan pipeline: detectors, reconciliation, orchestration, masking.
//!
//! - [`regex_detector`]: deterministic PII/secret patterns
//! - [`ner`]: external NER analyzer behind a trait, with filtering
//! - [`injection`]: prompt-injection heuristics (signals, not entities)
//! - [`context`]: persona keyword scoring (signals, not entities)
//! - [`normalizer`]: one canonical entity taxonomy
//! - [`merger`]: cross-detector dedup with deterministic ordering
//! - [`engine`]: the scan orchestrator
//! - [`mask`]: span masking for the `mask` action

pub mod context;
pub mod engine;
pub mod entity;
pub mod injection;
pub mod mask;
pub mod merger;
pub mod ner;
pub mod normalizer;
pub mod regex_detector;
pub mod signals;

pub use context::{ContextScorer, ContextSignals};
pub use engine::{ScanEngine, ScanResult};
pub use entity::{Entity, SOURCE_LOCAL_REGEX, SOURCE_NER};
pub use injection::{InjectionDecision, InjectionDetector, InjectionResult};
pub use mask::MaskService;
pub use merger::{EntityMerger, MergeConfig};
pub use ner::{NerAnalyzer, NerConfig, NerDetector, NerFinding};
pub use normalizer::TypeNormalizer;
pub use regex_detector::RegexDetector;
pub use signals::Signals;
