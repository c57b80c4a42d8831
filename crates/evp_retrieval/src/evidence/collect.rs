use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use evp_core::clock::now_rfc3339_utc;
use evp_core::documents::DocumentStore;
use evp_core::error::AppError;
use evp_core::provenance::ProvenanceSource;
use evp_core::text::truncate_chars;
use tracing::{debug, info, warn};

use super::source::SourceHasher;
use super::{evidence_id, format_citation, merge_evidence, EvidenceFilters, EvidenceItem};
use crate::context::AuditContext;
use crate::retrieve::SearchEngine;

/// Search pool over-fetch so dedup and filtering still leave `max_items` candidates.
const SEARCH_OVERFETCH: usize = 4;

pub struct EvidenceCollector<'a> {
    search: &'a SearchEngine,
    documents: &'a DocumentStore,
    provenance: &'a dyn ProvenanceSource,
    source_dirs: &'a [PathBuf],
    excerpt_max_chars: usize,
}

impl<'a> EvidenceCollector<'a> {
    pub fn new(ctx: &'a AuditContext) -> Self {
        Self {
            search: &ctx.search,
            documents: &ctx.documents,
            provenance: ctx.provenance.as_ref(),
            source_dirs: &ctx.config.source_dirs,
            excerpt_max_chars: ctx.config.excerpt_max_chars,
        }
    }

    pub fn collect_from_search(
        &self,
        query: &str,
        max_items: usize,
        filters: &EvidenceFilters,
    ) -> Result<Vec<EvidenceItem>, AppError> {
        let collected_at = now_rfc3339_utc()?;
        let mut hasher = SourceHasher::new(self.source_dirs);
        self.search_pool(query, max_items, filters, &collected_at, &mut hasher)
    }

    /// `None` when the provenance store has nothing for `case_id`.
    pub fn collect_from_provenance(
        &self,
        case_id: &str,
        max_items: usize,
        filters: &EvidenceFilters,
    ) -> Result<Option<Vec<EvidenceItem>>, AppError> {
        let collected_at = now_rfc3339_utc()?;
        let mut hasher = SourceHasher::new(self.source_dirs);
        self.provenance_pool(case_id, max_items, filters, &collected_at, &mut hasher)
    }

    /// Provenance pool first, then the query pool; merged, deduped and capped.
    pub fn collect(
        &self,
        query: Option<&str>,
        case_id: Option<&str>,
        max_items: usize,
        filters: &EvidenceFilters,
    ) -> Result<Vec<EvidenceItem>, AppError> {
        let collected_at = now_rfc3339_utc()?;
        let mut hasher = SourceHasher::new(self.source_dirs);
        let mut pools = Vec::new();

        if let Some(case_id) = case_id {
            match self.provenance_pool(case_id, max_items, filters, &collected_at, &mut hasher)? {
                Some(items) => pools.push(items),
                None if query.is_none() => {
                    return Err(AppError::new(
                        "PROVENANCE_NOT_FOUND",
                        "No draft provenance recorded for case",
                    )
                    .with_details(format!("case_id={case_id}")));
                }
                None => warn!(case_id, "no draft provenance for case; using query evidence only"),
            }
        }
        if let Some(query) = query {
            pools.push(self.search_pool(query, max_items, filters, &collected_at, &mut hasher)?);
        }

        let pooled: usize = pools.iter().map(Vec::len).sum();
        let merged = merge_evidence(pools, max_items);
        info!(pooled, kept = merged.len(), max_items, "evidence collected");
        Ok(merged)
    }

    fn search_pool(
        &self,
        query: &str,
        max_items: usize,
        filters: &EvidenceFilters,
        collected_at: &str,
        hasher: &mut SourceHasher<'_>,
    ) -> Result<Vec<EvidenceItem>, AppError> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let hits = self.search.search(query, max_items.saturating_mul(SEARCH_OVERFETCH))?;

        let mut seen: BTreeSet<(String, u32, u32)> = BTreeSet::new();
        let mut items = Vec::new();
        for hit in hits {
            let c = hit.citation;
            if !seen.insert((hit.doc_id.clone(), c.page_number, c.line_start)) {
                continue;
            }
            if !filters.allows(Some(hit.doc_id.as_str())) {
                continue;
            }
            let source = hasher.hash(&c.filename);
            debug!(record_id = hit.record_id, score = hit.score, filename = %c.filename, "query evidence");
            items.push(EvidenceItem {
                evidence_id: evidence_id(&c.filename, c.page_number, c.line_start, c.line_end),
                doc_id: hit.doc_id,
                citation: format_citation(&c.filename, c.page_number, c.line_start, c.line_end),
                excerpt: truncate_chars(&hit.text, self.excerpt_max_chars),
                page: c.page_number,
                start_line: c.line_start,
                end_line: c.line_end,
                filename: c.filename,
                source_hash: source.sha256,
                source_hash_fallback: source.fallback,
                collected_at: collected_at.to_string(),
                redaction_applied: false,
            });
            if items.len() >= max_items {
                break;
            }
        }
        Ok(items)
    }

    fn provenance_pool(
        &self,
        case_id: &str,
        max_items: usize,
        filters: &EvidenceFilters,
        collected_at: &str,
        hasher: &mut SourceHasher<'_>,
    ) -> Result<Option<Vec<EvidenceItem>>, AppError> {
        let Some(map) = self.provenance.list_provenance_citations(case_id)? else {
            return Ok(None);
        };

        // filename -> catalog doc id, resolved lazily and only when filtering.
        let mut doc_ids: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut items = Vec::new();
        for (field_path, cits) in map {
            for c in cits {
                if items.len() >= max_items {
                    return Ok(Some(items));
                }
                if !filters.doc_ids.is_empty() {
                    let resolved = match doc_ids.get(&c.filename) {
                        Some(r) => r.clone(),
                        None => {
                            let r = self.documents.find_by_filename(&c.filename)?.map(|d| d.doc_id);
                            doc_ids.insert(c.filename.clone(), r.clone());
                            r
                        }
                    };
                    if !filters.allows(resolved.as_deref()) {
                        continue;
                    }
                }
                let source = hasher.hash(&c.filename);
                debug!(field = %field_path, filename = %c.filename, page = c.page, line = c.line, "provenance evidence");
                items.push(EvidenceItem {
                    evidence_id: evidence_id(&c.filename, c.page, c.line, c.line),
                    doc_id: String::new(),
                    citation: format_citation(&c.filename, c.page, c.line, c.line),
                    excerpt: truncate_chars(&c.excerpt, self.excerpt_max_chars),
                    page: c.page,
                    start_line: c.line,
                    end_line: c.line,
                    filename: c.filename,
                    source_hash: source.sha256,
                    source_hash_fallback: source.fallback,
                    collected_at: collected_at.to_string(),
                    redaction_applied: false,
                });
            }
        }
        Ok(Some(items))
    }
}
