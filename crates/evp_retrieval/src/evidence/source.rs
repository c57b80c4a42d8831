use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evp_core::documents::basename;
use evp_core::error::AppError;
use evp_core::hashing::{sha256_file_hex, sha256_hex};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHash {
    pub sha256: String,
    /// Set when the file was not found and the filename itself was hashed.
    pub fallback: bool,
}

/// Finds `filename` by basename in each source dir in order, then as given.
pub fn locate_source(filename: &str, source_dirs: &[PathBuf]) -> Option<PathBuf> {
    let name = basename(filename);
    source_dirs
        .iter()
        .map(|d| d.join(name))
        .chain(std::iter::once(PathBuf::from(filename)))
        .find(|p| p.is_file())
}

/// Hashes evidence source files, memoized per filename for one collection run.
#[derive(Debug)]
pub struct SourceHasher<'a> {
    source_dirs: &'a [PathBuf],
    seen: BTreeMap<String, SourceHash>,
}

impl<'a> SourceHasher<'a> {
    pub fn new(source_dirs: &'a [PathBuf]) -> Self {
        Self {
            source_dirs,
            seen: BTreeMap::new(),
        }
    }

    pub fn hash(&mut self, filename: &str) -> SourceHash {
        if let Some(h) = self.seen.get(filename) {
            return h.clone();
        }
        let h = match locate_source(filename, self.source_dirs) {
            Some(path) => match sha256_file_hex(&path) {
                Ok((sha256, _)) => SourceHash {
                    sha256,
                    fallback: false,
                },
                Err(e) => fallback(filename, Some(&path), Some(&e)),
            },
            None => fallback(filename, None, None),
        };
        self.seen.insert(filename.to_string(), h.clone());
        h
    }
}

fn fallback(filename: &str, path: Option<&Path>, cause: Option<&AppError>) -> SourceHash {
    let err = AppError::new("EVIDENCE_SOURCE_MISSING", "Evidence source file unavailable; hashing filename");
    warn!(
        code = %err.code,
        filename,
        path = ?path,
        cause = ?cause.map(|c| c.code.as_str()),
        "{}",
        err.message
    );
    SourceHash {
        sha256: sha256_hex(filename.as_bytes()),
        fallback: true,
    }
}
