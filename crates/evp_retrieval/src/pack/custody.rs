use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use evp_core::error::AppError;
use evp_core::hashing::write_json_atomic;
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceFilters;

pub const CHAIN_OF_CUSTODY_JSON: &str = "chain_of_custody.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainOfCustody {
    pub pack_id: String,
    pub created_by: String,
    pub created_at: String,
    pub query_or_case_id: String,
    pub filters: EvidenceFilters,
    pub evidence_ids: Vec<String>,
    pub redaction_mode: String,
    pub tool_versions: BTreeMap<String, String>,
    pub host_info: BTreeMap<String, String>,
    /// Set only once the archive has been written and hashed.
    pub archive_sha256: Option<String>,
}

impl ChainOfCustody {
    pub fn is_finalized(&self) -> bool {
        self.archive_sha256.as_deref().is_some_and(|h| !h.is_empty())
    }
}

pub fn tool_versions() -> BTreeMap<String, String> {
    BTreeMap::from([
        (env!("CARGO_PKG_NAME").to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ("index_format".to_string(), "1".to_string()),
    ])
}

fn hostname() -> String {
    if let Ok(h) = std::env::var("HOSTNAME") {
        if !h.trim().is_empty() {
            return h.trim().to_string();
        }
    }
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn host_info() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("hostname".to_string(), hostname()),
        ("os".to_string(), std::env::consts::OS.to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
    ])
}

pub fn write_custody(build_dir: &Path, record: &ChainOfCustody) -> Result<(), AppError> {
    write_json_atomic(&build_dir.join(CHAIN_OF_CUSTODY_JSON), record, "PACK_CUSTODY")
}

pub fn read_custody(build_dir: &Path) -> Result<Option<ChainOfCustody>, AppError> {
    let path = build_dir.join(CHAIN_OF_CUSTODY_JSON);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(|e| {
        AppError::new("PACK_CUSTODY_READ_FAILED", "Failed to read chain of custody")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let record = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("PACK_CUSTODY_DECODE_FAILED", "Failed to decode chain of custody")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    Ok(Some(record))
}
