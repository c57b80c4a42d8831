use evp_core::error::AppError;
use sha2::{Digest, Sha256};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

/// Model-free pseudo-embedding. Reproducible across processes and builds; carries no
/// semantic signal beyond exact-text identity.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        Ok(embed(input, self.dim))
    }
}

/// Deterministic unit vector of length `dim` for `text`.
///
/// Components come from SHA-256 in counter mode over the text digest, mapped to
/// `[-1, 1]`, then L2-normalized in f64. A zero-norm draw yields the zero vector.
pub fn embed(text: &str, dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }
    let seed = Sha256::digest(text.as_bytes());

    let mut raw: Vec<f64> = Vec::with_capacity(dim);
    let mut block: u64 = 0;
    while raw.len() < dim {
        let mut h = Sha256::new();
        h.update(seed);
        h.update(block.to_le_bytes());
        let out = h.finalize();
        for word in out.chunks_exact(4) {
            if raw.len() == dim {
                break;
            }
            let u = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            raw.push((u as f64 / u32::MAX as f64) * 2.0 - 1.0);
        }
        block += 1;
    }

    let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vec![0.0; dim];
    }
    raw.into_iter().map(|x| (x / norm) as f32).collect()
}

pub fn embed_batch(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
    texts.iter().map(|t| embedder.embed(t)).collect()
}
