//! Audit-pack assembly.
//!
//! A build runs linearly through [`PackStage`]s and is not resumable. Anything that
//! fails before the archive is written leaves the partial `packs/<id>/` directory in
//! place for diagnosis and produces no archive. A pack is complete only when its
//! `chain_of_custody.json` carries the archive hash.

pub mod archive;
pub mod custody;
pub mod html;
pub mod manifest;
mod verify;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use evp_core::clock::now_rfc3339_utc;
use evp_core::config::RedactionConfig;
use evp_core::error::AppError;
use evp_core::hashing::{sha256_file_hex, write_atomic, write_json_atomic};
use evp_core::redact::{RedactionLog, RedactionPatterns};
use evp_core::text::sanitize_filename;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::AuditContext;
use crate::evidence::{EvidenceCollector, EvidenceFilters, EvidenceItem};
use archive::zip_dir_deterministic;
use custody::{host_info, tool_versions, write_custody, ChainOfCustody, CHAIN_OF_CUSTODY_JSON};
use html::{render_index_html, IndexPage, INDEX_HTML};
use manifest::{manifest_rows, read_manifest, write_manifest, Manifest, MANIFEST_JSON};

pub use verify::{verify_pack, PackVerification, VerifyMismatch};

pub const DEFAULT_REDACTION_MODE: &str = "overlay";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedactionRequest {
    pub mode: Option<String>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackRequest {
    pub created_by: String,
    pub case_id: Option<String>,
    pub query: Option<String>,
    pub filters: EvidenceFilters,
    /// Pull citations from draft provenance when `case_id` is set.
    pub include_provenance: bool,
    pub redaction: RedactionRequest,
    /// Falls back to the configured default.
    pub max_items: Option<usize>,
}

impl Default for PackRequest {
    fn default() -> Self {
        Self {
            created_by: "dev".to_string(),
            case_id: None,
            query: None,
            filters: EvidenceFilters::default(),
            include_provenance: true,
            redaction: RedactionRequest::default(),
            max_items: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PackStage {
    Created,
    EvidenceCollected,
    Redacted,
    FilesWritten,
    ManifestWritten,
    CustodyDrafted,
    Archived,
    CustodyFinalized,
}

struct StageTracker<'a> {
    pack_id: &'a str,
    stage: PackStage,
}

impl<'a> StageTracker<'a> {
    fn start(pack_id: &'a str) -> Self {
        info!(pack_id, stage = ?PackStage::Created, "audit pack stage");
        Self {
            pack_id,
            stage: PackStage::Created,
        }
    }

    fn advance(&mut self, next: PackStage) {
        debug_assert!(next > self.stage, "pack stages only move forward");
        info!(pack_id = self.pack_id, from = ?self.stage, stage = ?next, "audit pack stage");
        self.stage = next;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackCounts {
    pub items: usize,
    pub redacted_items: usize,
    pub fallback_hashed_items: usize,
    pub invalid_patterns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackBuildResult {
    pub pack_id: String,
    pub archive_path: PathBuf,
    pub archive_sha256: String,
    pub build_dir: PathBuf,
    pub index_path: PathBuf,
    pub manifest_path: PathBuf,
    pub custody_path: PathBuf,
    pub counts: PackCounts,
    pub duration_ms: u64,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn create_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|e| {
        AppError::new("PACK_DIR_IO_FAILED", "Failed to create pack directory")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

/// Parses a pack id and returns its canonical form, so it is safe to join onto a path.
pub fn validate_pack_id(pack_id: &str) -> Result<String, AppError> {
    Uuid::parse_str(pack_id.trim())
        .map(|u| u.hyphenated().to_string())
        .map_err(|e| {
            AppError::new("PACK_ID_INVALID", "Pack id is not a UUID")
                .with_details(format!("pack_id={pack_id}; err={e}"))
        })
}

pub fn pack_dir(packs_dir: &Path, pack_id: &str) -> Result<PathBuf, AppError> {
    let id = validate_pack_id(pack_id)?;
    let dir = packs_dir.join(&id);
    if !dir.is_dir() {
        return Err(AppError::new("PACK_NOT_FOUND", "Pack not found").with_details(format!("pack_id={id}")));
    }
    Ok(dir)
}

pub fn fetch_manifest(packs_dir: &Path, pack_id: &str) -> Result<Manifest, AppError> {
    let dir = pack_dir(packs_dir, pack_id)?;
    read_manifest(&dir)?.ok_or_else(|| {
        AppError::new("PACK_MANIFEST_NOT_FOUND", "Pack has no manifest")
            .with_details(format!("path={}", dir.join(MANIFEST_JSON).display()))
    })
}

/// Path of a finished pack archive.
pub fn archive_path(packs_dir: &Path, pack_id: &str) -> Result<PathBuf, AppError> {
    let id = validate_pack_id(pack_id)?;
    let path = packs_dir.join(format!("{id}.zip"));
    if !path.is_file() {
        return Err(AppError::new("PACK_ARCHIVE_NOT_FOUND", "Pack archive not found")
            .with_details(format!("pack_id={id}")));
    }
    Ok(path)
}

pub fn build_audit_pack(ctx: &AuditContext, req: &PackRequest) -> Result<PackBuildResult, AppError> {
    let t0 = Instant::now();

    let query = non_blank(req.query.as_deref());
    let case_id = non_blank(req.case_id.as_deref());
    let Some(subject) = case_id.or(query) else {
        return Err(AppError::new(
            "PACK_REQUEST_INVALID",
            "Provide a query or a case id",
        ));
    };
    let max_items = req.max_items.unwrap_or(ctx.config.default_max_items);
    if max_items == 0 {
        return Err(AppError::new("PACK_REQUEST_INVALID", "max_items must be positive"));
    }

    let pack_id = Uuid::new_v4().hyphenated().to_string();
    let packs_dir = ctx.config.packs_dir.as_path();
    let build_dir = packs_dir.join(&pack_id);
    let evidence_dir = build_dir.join("evidence");
    let redactions_dir = build_dir.join("redactions");
    create_dir(&evidence_dir)?;
    create_dir(&redactions_dir)?;
    let mut stage = StageTracker::start(&pack_id);

    // Collect
    let collector = EvidenceCollector::new(ctx);
    let provenance_case = case_id.filter(|_| req.include_provenance);
    let mut evidence = collector.collect(query, provenance_case, max_items, &req.filters)?;
    stage.advance(PackStage::EvidenceCollected);

    // Redact
    let redaction_cfg = RedactionConfig::load(&ctx.config.redaction_config);
    let patterns = redaction_cfg.merged_patterns(&req.redaction.patterns);
    let mode = req
        .redaction
        .mode
        .clone()
        .or_else(|| redaction_cfg.mode.clone())
        .unwrap_or_else(|| DEFAULT_REDACTION_MODE.to_string());
    let regions_count = redaction_cfg.regions.len();

    let compiled = RedactionPatterns::compile(&patterns);
    let invalid_patterns = compiled.invalid().len();
    let mut logs: Vec<RedactionLog> = Vec::with_capacity(evidence.len());
    for ev in evidence.iter_mut() {
        let outcome = compiled.apply(&ev.excerpt);
        logs.push(RedactionLog::from_outcome(&ev.filename, ev.page, &outcome, regions_count));
        ev.redaction_applied = outcome.applied();
        ev.excerpt = outcome.text;
    }
    stage.advance(PackStage::Redacted);

    // Evidence files and redaction logs
    let mut written: Vec<(String, EvidenceItem)> = Vec::with_capacity(evidence.len());
    for (idx, (ev, log)) in evidence.iter().zip(logs.iter()).enumerate() {
        let name = format!("{:03}_{}", idx + 1, sanitize_filename(&ev.filename));
        let rel = format!("evidence/{name}.txt");
        write_atomic(&build_dir.join(&rel), ev.excerpt.as_bytes(), "PACK_EVIDENCE")?;
        write_json_atomic(
            &redactions_dir.join(format!("{name}.redaction.json")),
            log,
            "PACK_REDACTION_LOG",
        )?;
        debug!(pack_id = %pack_id, evidence_id = %ev.evidence_id, path = %rel, "evidence written");
        written.push((rel, ev.clone()));
    }
    stage.advance(PackStage::FilesWritten);

    // Manifest from bytes on disk, then the human-readable index
    let rows = manifest_rows(&build_dir, &written)?;
    write_manifest(&build_dir, &rows)?;
    let created_at = now_rfc3339_utc()?;
    let index_html = render_index_html(&IndexPage {
        pack_id: &pack_id,
        created_by: &req.created_by,
        created_at: &created_at,
        query_or_case_id: subject,
        redaction_mode: &mode,
        items: &evidence,
        rows: &rows,
    })?;
    write_atomic(&build_dir.join(INDEX_HTML), index_html.as_bytes(), "PACK_INDEX")?;
    stage.advance(PackStage::ManifestWritten);

    // Custody draft; archive hash filled in after zipping
    let mut custody = ChainOfCustody {
        pack_id: pack_id.clone(),
        created_by: req.created_by.clone(),
        created_at,
        query_or_case_id: subject.to_string(),
        filters: req.filters.clone(),
        evidence_ids: evidence.iter().map(|e| e.evidence_id.clone()).collect(),
        redaction_mode: mode,
        tool_versions: tool_versions(),
        host_info: host_info(),
        archive_sha256: None,
    };
    write_custody(&build_dir, &custody)?;
    stage.advance(PackStage::CustodyDrafted);

    let archive = packs_dir.join(format!("{pack_id}.zip"));
    let entries = zip_dir_deterministic(&build_dir, &archive)?;
    stage.advance(PackStage::Archived);

    let (archive_sha256, archive_bytes) = sha256_file_hex(&archive)?;
    custody.archive_sha256 = Some(archive_sha256.clone());
    write_custody(&build_dir, &custody)?;
    stage.advance(PackStage::CustodyFinalized);

    let counts = PackCounts {
        items: evidence.len(),
        redacted_items: evidence.iter().filter(|e| e.redaction_applied).count(),
        fallback_hashed_items: evidence.iter().filter(|e| e.source_hash_fallback).count(),
        invalid_patterns,
    };
    let duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        pack_id = %pack_id,
        items = counts.items,
        redacted = counts.redacted_items,
        fallback_hashed = counts.fallback_hashed_items,
        entries,
        archive_bytes,
        duration_ms,
        "audit pack built"
    );

    Ok(PackBuildResult {
        archive_path: archive,
        archive_sha256,
        index_path: build_dir.join(INDEX_HTML),
        manifest_path: build_dir.join(MANIFEST_JSON),
        custody_path: build_dir.join(CHAIN_OF_CUSTODY_JSON),
        build_dir,
        pack_id,
        counts,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_ids_are_canonicalized_or_rejected() {
        let id = "67E55044-10B1-426F-9247-BB680E5FE0C8";
        assert_eq!(validate_pack_id(id).unwrap(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
        let err = validate_pack_id("../../etc").unwrap_err();
        assert_eq!(err.code, "PACK_ID_INVALID");
    }

    #[test]
    fn default_request_includes_provenance() {
        let req: PackRequest = serde_json::from_str(r#"{"query":"Part"}"#).unwrap();
        assert!(req.include_provenance);
        assert_eq!(req.created_by, "dev");
        assert_eq!(req.max_items, None);
    }
}
