use std::fs;
use std::path::Path;

use evp_core::config::IndexBackendKind;
use evp_core::error::AppError;

use super::backend::{dot, rank, read_vectors, write_vectors, VectorBackend};
use super::quantized::codes_path;

/// Exact scan over every stored vector.
#[derive(Debug, Clone)]
pub struct BruteForceBackend {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl BruteForceBackend {
    pub fn load(dir: &Path, dim: usize) -> Result<Self, AppError> {
        Ok(Self {
            dim,
            vectors: read_vectors(dir, dim)?,
        })
    }
}

impl VectorBackend for BruteForceBackend {
    fn kind(&self) -> IndexBackendKind {
        IndexBackendKind::BruteForce
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn append(&mut self, vectors: &[Vec<f32>]) {
        self.vectors.extend_from_slice(vectors);
    }

    fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len);
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(f32, usize)> {
        let scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| (dot(query, v), pos))
            .collect();
        rank(scored, top_k)
    }

    fn persist(&self, dir: &Path) -> Result<(), AppError> {
        write_vectors(dir, self.dim, &self.vectors)?;
        // A quantized code file from an earlier configuration would go stale from here on.
        let stale = codes_path(dir);
        if stale.exists() {
            fs::remove_file(&stale).map_err(|e| {
                AppError::new("INDEX_CODES_WRITE_FAILED", "Failed to remove stale quantized index")
                    .with_details(format!("path={}; err={}", stale.display(), e))
            })?;
        }
        Ok(())
    }
}
