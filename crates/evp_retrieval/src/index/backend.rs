use std::fs;
use std::path::{Path, PathBuf};

use evp_core::config::IndexBackendKind;
use evp_core::error::AppError;
use evp_core::hashing::write_json_atomic;
use serde::{Deserialize, Serialize};

use super::brute_force::BruteForceBackend;
use super::quantized::QuantizedBackend;

/// Storage and scoring for the vector half of the index. Positions are dense and
/// line up with record ids; the owning index keeps the two in step.
pub trait VectorBackend: Send + Sync {
    fn kind(&self) -> IndexBackendKind;
    fn len(&self) -> usize;
    fn append(&mut self, vectors: &[Vec<f32>]);
    fn truncate(&mut self, len: usize);
    /// `(score, position)` best first, ties broken by ascending position.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<(f32, usize)>;
    fn persist(&self, dir: &Path) -> Result<(), AppError>;
}

pub fn open_backend(
    kind: IndexBackendKind,
    dim: usize,
    dir: &Path,
) -> Result<Box<dyn VectorBackend>, AppError> {
    Ok(match kind {
        IndexBackendKind::BruteForce => Box::new(BruteForceBackend::load(dir, dim)?),
        IndexBackendKind::Quantized => Box::new(QuantizedBackend::load(dir, dim)?),
    })
}

pub(crate) fn vectors_path(dir: &Path) -> PathBuf {
    dir.join("vectors.json")
}

#[derive(Debug, Deserialize)]
struct VectorFile {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct VectorFileRef<'a> {
    dim: usize,
    vectors: &'a [Vec<f32>],
}

pub(crate) fn read_vectors(dir: &Path, dim: usize) -> Result<Vec<Vec<f32>>, AppError> {
    let path = vectors_path(dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(&path).map_err(|e| {
        AppError::new("INDEX_VECTORS_READ_FAILED", "Failed to read index vectors")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let file: VectorFile = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("INDEX_VECTORS_DECODE_FAILED", "Failed to decode index vectors")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    if file.dim != dim {
        return Err(AppError::new(
            "INDEX_DIMENSION_MISMATCH",
            "Persisted index dimension differs from configured dimension",
        )
        .with_details(format!("path={}; persisted={}; configured={}", path.display(), file.dim, dim)));
    }
    if let Some((pos, v)) = file.vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
        return Err(AppError::new(
            "INDEX_DIMENSION_MISMATCH",
            "Persisted vector has the wrong dimension",
        )
        .with_details(format!("path={}; position={}; got={}; expected={}", path.display(), pos, v.len(), dim)));
    }
    Ok(file.vectors)
}

pub(crate) fn write_vectors(dir: &Path, dim: usize, vectors: &[Vec<f32>]) -> Result<(), AppError> {
    write_json_atomic(&vectors_path(dir), &VectorFileRef { dim, vectors }, "INDEX_VECTORS")
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

/// Sorts by descending score, then ascending position, and keeps `top_k`.
pub(crate) fn rank(mut scored: Vec<(f32, usize)>, top_k: usize) -> Vec<(f32, usize)> {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(top_k);
    scored
}
