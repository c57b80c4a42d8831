use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use evp_core::error::AppError;
use evp_core::hashing::{sha256_file_hex, write_atomic, write_json_atomic};
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceItem;

pub const MANIFEST_JSON: &str = "manifest.json";
pub const MANIFEST_CSV: &str = "manifest.csv";
pub const HASHES_JSON: &str = "hashes.json";

const CSV_COLUMNS: [&str; 12] = [
    "evidence_id",
    "filename",
    "page",
    "start_line",
    "end_line",
    "sha256",
    "bytes",
    "citation",
    "path",
    "redaction_applied",
    "source_hash",
    "source_hash_fallback",
];

/// One archived evidence file. `sha256` and `bytes` describe the file as written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestRow {
    pub evidence_id: String,
    pub filename: String,
    pub page: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub sha256: String,
    pub bytes: u64,
    pub citation: String,
    /// Relative to the pack directory, `/`-separated.
    pub path: String,
    pub redaction_applied: bool,
    pub source_hash: String,
    pub source_hash_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub rows: Vec<ManifestRow>,
}

/// Re-reads each written evidence file so the manifest reflects bytes on disk.
pub fn manifest_rows(build_dir: &Path, written: &[(String, EvidenceItem)]) -> Result<Vec<ManifestRow>, AppError> {
    let mut rows = Vec::with_capacity(written.len());
    for (rel, ev) in written {
        let (sha256, bytes) = sha256_file_hex(&build_dir.join(rel))?;
        rows.push(ManifestRow {
            evidence_id: ev.evidence_id.clone(),
            filename: ev.filename.clone(),
            page: ev.page,
            start_line: ev.start_line,
            end_line: ev.end_line,
            sha256,
            bytes,
            citation: ev.citation.clone(),
            path: rel.clone(),
            redaction_applied: ev.redaction_applied,
            source_hash: ev.source_hash.clone(),
            source_hash_fallback: ev.source_hash_fallback,
        });
    }
    Ok(rows)
}

fn manifest_csv_bytes(rows: &[ManifestRow]) -> Result<Vec<u8>, AppError> {
    let encode_err = |e: csv::Error| {
        AppError::new("PACK_MANIFEST_ENCODE_FAILED", "Failed to encode manifest CSV").with_details(e.to_string())
    };
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    // Header is written explicitly so an empty pack still gets one.
    w.write_record(CSV_COLUMNS).map_err(encode_err)?;
    for r in rows {
        w.serialize(r).map_err(encode_err)?;
    }
    w.into_inner().map_err(|e| {
        AppError::new("PACK_MANIFEST_ENCODE_FAILED", "Failed to flush manifest CSV").with_details(e.to_string())
    })
}

/// Writes `manifest.json`, `manifest.csv` and `hashes.json` (evidence id → sha256).
pub fn write_manifest(build_dir: &Path, rows: &[ManifestRow]) -> Result<(), AppError> {
    let manifest = Manifest { rows: rows.to_vec() };
    write_json_atomic(&build_dir.join(MANIFEST_JSON), &manifest, "PACK_MANIFEST")?;
    write_atomic(&build_dir.join(MANIFEST_CSV), &manifest_csv_bytes(rows)?, "PACK_MANIFEST")?;
    let hashes: BTreeMap<&str, &str> = rows
        .iter()
        .map(|r| (r.evidence_id.as_str(), r.sha256.as_str()))
        .collect();
    write_json_atomic(&build_dir.join(HASHES_JSON), &hashes, "PACK_MANIFEST")
}

pub fn read_manifest(build_dir: &Path) -> Result<Option<Manifest>, AppError> {
    let path = build_dir.join(MANIFEST_JSON);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(|e| {
        AppError::new("PACK_MANIFEST_READ_FAILED", "Failed to read manifest")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let manifest = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("PACK_MANIFEST_DECODE_FAILED", "Failed to decode manifest")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    Ok(Some(manifest))
}
