//! Keyword-driven persona classification.
//!
//! The scorer loads a YAML file mapping personas to keyword lists and
//! counts lower-cased keyword hits over the lower-cased input. The persona
//! with the strictly largest hit set wins; a tie between personas yields no
//! persona at all. The scorer produces signals only, never spans.

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Signals produced by the context scorer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSignals {
    pub persona: Option<String>,
    pub keyword_hits: Vec<String>,
    pub risk_boost: f64,
}

#[derive(Debug, Deserialize)]
struct PersonaEntry {
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonaFile {
    #[serde(default)]
    personas: HashMap<String, PersonaEntry>,
}

/// Persona classifier over configured keyword lists.
#[derive(Debug, Clone, Default)]
pub struct ContextScorer {
    persona_keywords: HashMap<String, Vec<String>>,
}

impl ContextScorer {
    /// A scorer with no personas: always yields empty signals.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: PersonaFile = serde_yaml::from_str(content)?;
        let persona_keywords = file
            .personas
            .into_iter()
            .map(|(persona, entry)| {
                let keywords = entry
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .collect();
                (persona, keywords)
            })
            .collect();
        Ok(Self { persona_keywords })
    }

    /// Score input text. At most the top 10 keyword hits are reported.
    pub fn score(&self, text: &str) -> ContextSignals {
        let lower = text.to_lowercase();

        let mut best: Option<(&str, Vec<String>)> = None;
        let mut tied = false;

        for (persona, keywords) in &self.persona_keywords {
            let hits: Vec<String> = keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .cloned()
                .collect();
            if hits.is_empty() {
                continue;
            }
            match &best {
                Some((_, best_hits)) if hits.len() == best_hits.len() => tied = true,
                Some((_, best_hits)) if hits.len() > best_hits.len() => {
                    best = Some((persona, hits));
                    tied = false;
                }
                Some(_) => {}
                None => {
                    best = Some((persona, hits));
                    tied = false;
                }
            }
        }

        let Some((persona, mut hits)) = (if tied { None } else { best }) else {
            return ContextSignals {
                persona: None,
                keyword_hits: Vec::new(),
                risk_boost: 0.0,
            };
        };

        hits.truncate(10);
        let risk_boost = match persona {
            "dev" => 0.15,
            "office" => 0.10,
            _ => 0.0,
        };

        ContextSignals {
            persona: Some(persona.to_string()),
            keyword_hits: hits,
            risk_boost,
        }
    }
}
