use std::fs;
use std::io::Read;
use std::path::{Component, Path};

use evp_core::error::AppError;
use evp_core::hashing::{sha256_file_hex, sha256_hex};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zip::ZipArchive;

use super::custody::read_custody;
use super::{archive_path, fetch_manifest, pack_dir, validate_pack_id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyMismatch {
    /// `evidence/...` path, `archive:evidence/...` entry, or `archive`.
    pub subject: String,
    pub expected: String,
    /// `None` when the subject is missing or unreadable.
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackVerification {
    pub pack_id: String,
    pub finalized: bool,
    pub archive_present: bool,
    pub rows_checked: usize,
    pub mismatches: Vec<VerifyMismatch>,
    pub ok: bool,
}

fn is_plain_relative(rel: &str) -> bool {
    let p = Path::new(rel);
    !rel.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)))
}

fn archive_entry_sha256(archive: &mut ZipArchive<fs::File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).ok()?;
    Some(sha256_hex(&buf))
}

/// Re-hashes a pack against its own records: each manifest row against the file in
/// the pack directory and the archived copy, and the archive against the custody hash.
pub fn verify_pack(packs_dir: &Path, pack_id: &str) -> Result<PackVerification, AppError> {
    let id = validate_pack_id(pack_id)?;
    let dir = pack_dir(packs_dir, &id)?;
    let manifest = fetch_manifest(packs_dir, &id)?;
    let custody = read_custody(&dir)?;
    let finalized = custody.as_ref().is_some_and(|c| c.is_finalized());

    let archive = archive_path(packs_dir, &id).ok();
    let mut mismatches = Vec::new();

    let mut zip = match &archive {
        Some(path) => {
            let file = fs::File::open(path).map_err(|e| {
                AppError::new("PACK_ARCHIVE_READ_FAILED", "Failed to open pack archive")
                    .with_details(format!("path={}; err={}", path.display(), e))
            })?;
            match ZipArchive::new(file) {
                Ok(z) => Some(z),
                Err(e) => {
                    warn!(pack_id = %id, error = %e, "pack archive is not a readable zip");
                    None
                }
            }
        }
        None => None,
    };

    for row in &manifest.rows {
        if !is_plain_relative(&row.path) {
            mismatches.push(VerifyMismatch {
                subject: row.path.clone(),
                expected: row.sha256.clone(),
                actual: None,
            });
            continue;
        }
        let on_disk = sha256_file_hex(&dir.join(&row.path)).ok().map(|(h, _)| h);
        if on_disk.as_deref() != Some(row.sha256.as_str()) {
            mismatches.push(VerifyMismatch {
                subject: row.path.clone(),
                expected: row.sha256.clone(),
                actual: on_disk,
            });
        }
        if let Some(z) = zip.as_mut() {
            let archived = archive_entry_sha256(z, &row.path);
            if archived.as_deref() != Some(row.sha256.as_str()) {
                mismatches.push(VerifyMismatch {
                    subject: format!("archive:{}", row.path),
                    expected: row.sha256.clone(),
                    actual: archived,
                });
            }
        }
    }

    if let (Some(path), Some(expected)) = (&archive, custody.as_ref().and_then(|c| c.archive_sha256.clone())) {
        let actual = sha256_file_hex(path)?.0;
        if actual != expected {
            mismatches.push(VerifyMismatch {
                subject: "archive".to_string(),
                expected,
                actual: Some(actual),
            });
        }
    }

    let ok = finalized && archive.is_some() && mismatches.is_empty();
    info!(
        pack_id = %id,
        rows = manifest.rows.len(),
        mismatches = mismatches.len(),
        finalized,
        ok,
        "pack verified"
    );
    Ok(PackVerification {
        pack_id: id,
        finalized,
        archive_present: archive.is_some(),
        rows_checked: manifest.rows.len(),
        mismatches,
        ok,
    })
}
