use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Streams a file through SHA-256. Returns `(hex digest, byte count)`.
pub fn sha256_file_hex(path: &Path) -> Result<(String, u64), AppError> {
    let mut f = fs::File::open(path).map_err(|e| {
        AppError::new("HASH_FILE_READ_FAILED", "Failed to open file for hashing")
            .with_details(format!("path={}: {}", path.display(), e))
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        let n = f.read(&mut buf).map_err(|e| {
            AppError::new("HASH_FILE_READ_FAILED", "Failed to read file for hashing")
                .with_details(format!("path={}: {}", path.display(), e))
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Writes `bytes` to a sibling `.tmp` file and renames it over `path`, so readers
/// only ever observe the previous or the complete new content.
pub fn write_atomic(path: &Path, bytes: &[u8], code_prefix: &str) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| {
        AppError::new(format!("{code_prefix}_WRITE_FAILED"), "Failed to write file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(format!("{code_prefix}_WRITE_FAILED"), "Failed to finalize file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}

pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    code_prefix: &str,
) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new(format!("{code_prefix}_ENCODE_FAILED"), "Failed to encode JSON")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    write_atomic(path, json.as_bytes(), code_prefix)
}
