//! Evidence collection: semantic-search hits and draft provenance citations, merged
//! into one deduplicated, bounded list of [`EvidenceItem`]s.

mod collect;
pub mod source;

use std::collections::BTreeMap;

use evp_core::hashing::sha256_hex;
use serde::{Deserialize, Serialize};

pub use collect::EvidenceCollector;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceItem {
    pub evidence_id: String,
    /// Empty for items sourced from provenance.
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub excerpt: String,
    pub citation: String,
    pub source_hash: String,
    pub source_hash_fallback: bool,
    pub collected_at: String,
    pub redaction_applied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvidenceFilters {
    /// When non-empty, only evidence from these documents is kept.
    pub doc_ids: Vec<String>,
}

impl EvidenceFilters {
    pub fn allows(&self, doc_id: Option<&str>) -> bool {
        if self.doc_ids.is_empty() {
            return true;
        }
        doc_id.is_some_and(|id| self.doc_ids.iter().any(|d| d == id))
    }
}

pub fn format_citation(filename: &str, page: u32, start_line: u32, end_line: u32) -> String {
    format!("{filename} p{page} l{start_line}-{end_line}")
}

/// `ev_` + 16 hex chars of SHA-256 over the dedup key and line range. Stable across runs.
pub fn evidence_id(filename: &str, page: u32, start_line: u32, end_line: u32) -> String {
    let key = format!("{filename}\u{1f}{page}\u{1f}{start_line}\u{1f}{end_line}");
    let digest = sha256_hex(key.as_bytes());
    format!("ev_{}", &digest[..16])
}

/// Concatenates the pools in order and dedupes by `(filename, page, start_line)`.
/// A later duplicate replaces the earlier item but keeps the earlier position.
pub fn merge_evidence(pools: Vec<Vec<EvidenceItem>>, max_items: usize) -> Vec<EvidenceItem> {
    let mut slots: BTreeMap<(String, u32, u32), usize> = BTreeMap::new();
    let mut merged: Vec<EvidenceItem> = Vec::new();
    for item in pools.into_iter().flatten() {
        let key = (item.filename.clone(), item.page, item.start_line);
        match slots.get(&key) {
            Some(&pos) => merged[pos] = item,
            None => {
                slots.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged.truncate(max_items);
    merged
}
