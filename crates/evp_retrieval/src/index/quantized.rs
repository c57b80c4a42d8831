use std::fs;
use std::path::{Path, PathBuf};

use evp_core::config::IndexBackendKind;
use evp_core::error::AppError;
use evp_core::hashing::write_json_atomic;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{dot, rank, read_vectors, write_vectors, VectorBackend};

/// Candidates pulled from the int8 scan before the exact rerank.
const RERANK_FACTOR: usize = 4;
const MIN_CANDIDATES: usize = 32;

pub(crate) fn codes_path(dir: &Path) -> PathBuf {
    dir.join("index_q8.json")
}

#[derive(Debug, Deserialize)]
struct CodeFile {
    dim: usize,
    scales: Vec<f32>,
    codes: Vec<Vec<i8>>,
}

#[derive(Debug, Serialize)]
struct CodeFileRef<'a> {
    dim: usize,
    scales: &'a [f32],
    codes: &'a [Vec<i8>],
}

/// Symmetric per-vector int8 quantization: `x ≈ code * scale`.
fn quantize(v: &[f32]) -> (Vec<i8>, f32) {
    let max_abs = v.iter().fold(0.0f32, |m, x| m.max(x.abs()));
    if max_abs == 0.0 || !max_abs.is_finite() {
        return (vec![0; v.len()], 0.0);
    }
    let scale = max_abs / 127.0;
    let codes = v
        .iter()
        .map(|x| (x / scale).round().clamp(-127.0, 127.0) as i8)
        .collect();
    (codes, scale)
}

fn dot_i8(a: &[i8], b: &[i8]) -> i32 {
    a.iter().zip(b.iter()).map(|(x, y)| *x as i32 * *y as i32).sum()
}

/// Approximate scan over int8 codes with an exact f32 rerank of the best candidates.
///
/// Full-precision vectors are kept alongside the codes, so results for the final
/// `top_k` carry exact scores and the same tie order as the brute-force backend.
#[derive(Debug, Clone)]
pub struct QuantizedBackend {
    dim: usize,
    vectors: Vec<Vec<f32>>,
    codes: Vec<Vec<i8>>,
    scales: Vec<f32>,
}

impl QuantizedBackend {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            codes: Vec::new(),
            scales: Vec::new(),
        }
    }

    pub fn load(dir: &Path, dim: usize) -> Result<Self, AppError> {
        let vectors = read_vectors(dir, dim)?;
        let path = codes_path(dir);

        let stored = if path.exists() {
            match fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|b| serde_json::from_slice::<CodeFile>(&b).map_err(|e| e.to_string()))
            {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable quantized index; rebuilding from vectors");
                    None
                }
            }
        } else {
            None
        };

        let mut backend = Self::new(dim);
        match stored {
            Some(f)
                if f.dim == dim
                    && f.codes.len() == vectors.len()
                    && f.scales.len() == vectors.len()
                    && f.codes.iter().all(|c| c.len() == dim) =>
            {
                backend.vectors = vectors;
                backend.codes = f.codes;
                backend.scales = f.scales;
            }
            _ => {
                debug!(count = vectors.len(), "quantizing index vectors");
                backend.append(&vectors);
            }
        }
        Ok(backend)
    }
}

impl VectorBackend for QuantizedBackend {
    fn kind(&self) -> IndexBackendKind {
        IndexBackendKind::Quantized
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn append(&mut self, vectors: &[Vec<f32>]) {
        for v in vectors {
            let (codes, scale) = quantize(v);
            self.codes.push(codes);
            self.scales.push(scale);
            self.vectors.push(v.clone());
        }
    }

    fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len);
        self.codes.truncate(len);
        self.scales.truncate(len);
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(f32, usize)> {
        if self.vectors.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let (q_codes, q_scale) = quantize(query);
        let approx = self
            .codes
            .iter()
            .zip(self.scales.iter())
            .enumerate()
            .map(|(pos, (c, s))| (dot_i8(&q_codes, c) as f32 * q_scale * s, pos))
            .collect();
        let pool = (top_k * RERANK_FACTOR).max(MIN_CANDIDATES);
        let exact = rank(approx, pool)
            .into_iter()
            .map(|(_, pos)| (dot(query, &self.vectors[pos]), pos))
            .collect();
        rank(exact, top_k)
    }

    fn persist(&self, dir: &Path) -> Result<(), AppError> {
        write_json_atomic(
            &codes_path(dir),
            &CodeFileRef {
                dim: self.dim,
                scales: &self.scales,
                codes: &self.codes,
            },
            "INDEX_CODES",
        )?;
        write_vectors(dir, self.dim, &self.vectors)
    }
}
