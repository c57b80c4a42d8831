use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const REDACTION_GLYPH: &str = "████";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionOutcome {
    pub text: String,
    /// Only patterns that matched at least once appear here.
    pub matches: BTreeMap<String, usize>,
    pub invalid_patterns: Vec<String>,
}

impl RedactionOutcome {
    pub fn applied(&self) -> bool {
        self.matches.values().any(|c| *c > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternMatchCount {
    pub pattern: String,
    pub count: usize,
}

/// Per-item log persisted next to the archived excerpt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionLog {
    pub filename: String,
    pub page: u32,
    pub matches: Vec<PatternMatchCount>,
    pub invalid_patterns: Vec<String>,
    pub regions_count: usize,
}

impl RedactionLog {
    pub fn from_outcome(filename: &str, page: u32, outcome: &RedactionOutcome, regions_count: usize) -> Self {
        Self {
            filename: filename.to_string(),
            page,
            matches: outcome
                .matches
                .iter()
                .map(|(pattern, count)| PatternMatchCount {
                    pattern: pattern.clone(),
                    count: *count,
                })
                .collect(),
            invalid_patterns: outcome.invalid_patterns.clone(),
            regions_count,
        }
    }
}

/// A merged pattern list compiled once. Invalid patterns are kept aside and reported
/// on every outcome.
#[derive(Debug, Clone)]
pub struct RedactionPatterns {
    compiled: Vec<(String, Regex)>,
    invalid: Vec<String>,
}

impl RedactionPatterns {
    pub fn compile(patterns: &[String]) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut invalid = Vec::new();
        for pat in patterns {
            match Regex::new(pat) {
                Ok(re) => compiled.push((pat.clone(), re)),
                Err(e) => {
                    warn!(pattern = %pat, error = %e, "skipping invalid redaction pattern");
                    invalid.push(pat.clone());
                }
            }
        }
        Self { compiled, invalid }
    }

    pub fn invalid(&self) -> &[String] {
        &self.invalid
    }

    /// Applies each pattern in order to the progressively redacted text, replacing every
    /// match with [`REDACTION_GLYPH`].
    pub fn apply(&self, content: &str) -> RedactionOutcome {
        let mut redacted = content.to_string();
        let mut matches = BTreeMap::new();

        for (pat, re) in &self.compiled {
            let count = re.find_iter(&redacted).filter(|m| !m.as_str().is_empty()).count();
            if count == 0 {
                continue;
            }
            redacted = re
                .replace_all(&redacted, |caps: &regex::Captures<'_>| {
                    if caps[0].is_empty() {
                        String::new()
                    } else {
                        REDACTION_GLYPH.to_string()
                    }
                })
                .into_owned();
            *matches.entry(pat.clone()).or_insert(0) += count;
        }

        RedactionOutcome {
            text: redacted,
            matches,
            invalid_patterns: self.invalid.clone(),
        }
    }
}

/// One-shot form of [`RedactionPatterns::apply`]. Invalid patterns are skipped and reported.
pub fn apply_text_redactions(content: &str, patterns: &[String]) -> RedactionOutcome {
    RedactionPatterns::compile(patterns).apply(content)
}
