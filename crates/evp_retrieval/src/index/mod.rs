//! Persistent vector index: one metadata record per stored vector.
//!
//! Layout under the index directory:
//! - `vectors.json`: `{ "dim", "vectors" }`, row `i` belongs to record id `i`
//! - `index_q8.json`: int8 codes, quantized backend only
//! - `meta.json`: `{ "records" }`, written last on every commit
//!
//! Every file is replaced via tmp + rename. On open the two halves are reconciled to
//! their common dense prefix, so a crash between writes loses at most the last batch.

pub mod backend;
pub mod brute_force;
pub mod quantized;

use std::fs;
use std::path::{Path, PathBuf};

use evp_core::config::IndexBackendKind;
use evp_core::error::AppError;
use evp_core::hashing::{sha256_hex, write_json_atomic};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use backend::{open_backend, VectorBackend};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorRecord {
    pub id: u64,
    pub doc_id: String,
    pub filename: String,
    pub page_number: u32,
    pub line_start: u32,
    pub line_end: u32,
    pub text_hash: String,
    pub text: String,
}

/// Metadata for a fragment about to be added; the index assigns the id and text hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMeta {
    pub doc_id: String,
    pub filename: String,
    pub page_number: u32,
    pub line_start: u32,
    pub line_end: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub score: f32,
    pub record: VectorRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaFile {
    records: Vec<VectorRecord>,
}

#[derive(Debug, Serialize)]
struct MetaFileRef<'a> {
    records: &'a [VectorRecord],
}

struct IndexState {
    backend: Box<dyn VectorBackend>,
    records: Vec<VectorRecord>,
}

pub struct VectorIndex {
    dir: PathBuf,
    dim: usize,
    state: RwLock<IndexState>,
}

fn meta_path(dir: &Path) -> PathBuf {
    dir.join("meta.json")
}

fn read_meta(dir: &Path) -> Result<Vec<VectorRecord>, AppError> {
    let path = meta_path(dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(&path).map_err(|e| {
        AppError::new("INDEX_META_READ_FAILED", "Failed to read index metadata")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let meta: MetaFile = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("INDEX_META_DECODE_FAILED", "Failed to decode index metadata")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    Ok(meta.records)
}

fn write_meta(dir: &Path, records: &[VectorRecord]) -> Result<(), AppError> {
    write_json_atomic(&meta_path(dir), &MetaFileRef { records }, "INDEX_META")
}

/// Leftovers from a write that never reached its rename.
fn remove_stale_tmp_files(dir: &Path) {
    for name in ["meta.tmp", "vectors.tmp", "index_q8.tmp"] {
        let p = dir.join(name);
        if p.exists() {
            match fs::remove_file(&p) {
                Ok(()) => debug!(path = %p.display(), "removed stale index temp file"),
                Err(e) => warn!(path = %p.display(), error = %e, "failed to remove stale index temp file"),
            }
        }
    }
}

fn check_dim(expected: usize, got: usize, what: &str) -> Result<(), AppError> {
    if expected == got {
        return Ok(());
    }
    Err(AppError::new(
        "INDEX_DIMENSION_MISMATCH",
        format!("{what} dimension does not match the index"),
    )
    .with_details(format!("expected={expected}; got={got}")))
}

impl VectorIndex {
    /// Opens (or creates) the index at `dir`, reconciling any half-written commit.
    pub fn open(dir: PathBuf, dim: usize, kind: IndexBackendKind) -> Result<Self, AppError> {
        if dim == 0 {
            return Err(AppError::new("INDEX_CONFIG_INVALID", "Embedding dimension must be positive"));
        }
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::new("INDEX_DIR_IO_FAILED", "Failed to create index directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        remove_stale_tmp_files(&dir);

        let mut records = read_meta(&dir)?;
        let mut backend = open_backend(kind, dim, &dir)?;

        let dense = records
            .iter()
            .enumerate()
            .take_while(|(i, r)| r.id == *i as u64)
            .count();
        let keep = dense.min(backend.len());
        if keep != records.len() || keep != backend.len() {
            warn!(
                path = %dir.display(),
                records = records.len(),
                vectors = backend.len(),
                kept = keep,
                "index halves disagree; truncating to common prefix"
            );
            records.truncate(keep);
            backend.truncate(keep);
            backend.persist(&dir)?;
            write_meta(&dir, &records)?;
        }

        info!(path = %dir.display(), backend = ?kind, dim, count = records.len(), "vector index opened");
        Ok(Self {
            dir,
            dim,
            state: RwLock::new(IndexState { backend, records }),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn backend_kind(&self) -> IndexBackendKind {
        self.state.read().backend.kind()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u64) -> Option<VectorRecord> {
        let state = self.state.read();
        usize::try_from(id).ok().and_then(|i| state.records.get(i).cloned())
    }

    /// Appends a batch and persists it. Returns the assigned ids.
    ///
    /// All-or-nothing: on a validation or persistence error nothing is added in memory.
    pub fn add(&self, vectors: Vec<Vec<f32>>, metadata: Vec<FragmentMeta>) -> Result<Vec<u64>, AppError> {
        if vectors.len() != metadata.len() {
            return Err(AppError::new(
                "INDEX_BATCH_INVALID",
                "Vector and metadata batch lengths differ",
            )
            .with_details(format!("vectors={}; metadata={}", vectors.len(), metadata.len())));
        }
        for v in &vectors {
            check_dim(self.dim, v.len(), "Vector")?;
        }
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write();
        let start = state.records.len();
        let new_records: Vec<VectorRecord> = metadata
            .into_iter()
            .enumerate()
            .map(|(i, m)| VectorRecord {
                id: (start + i) as u64,
                text_hash: sha256_hex(m.text.as_bytes()),
                doc_id: m.doc_id,
                filename: m.filename,
                page_number: m.page_number,
                line_start: m.line_start,
                line_end: m.line_end,
                text: m.text,
            })
            .collect();
        let ids = new_records.iter().map(|r| r.id).collect::<Vec<_>>();

        state.backend.append(&vectors);
        state.records.extend(new_records);

        let persisted = state
            .backend
            .persist(&self.dir)
            .and_then(|()| write_meta(&self.dir, &state.records));
        if let Err(e) = persisted {
            state.backend.truncate(start);
            state.records.truncate(start);
            warn!(path = %self.dir.display(), code = %e.code, "index commit failed; batch rolled back");
            return Err(e);
        }

        debug!(added = ids.len(), total = state.records.len(), "vector index committed");
        Ok(ids)
    }

    /// Top `top_k` records by cosine similarity, best first, ties by ascending id.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, AppError> {
        check_dim(self.dim, query.len(), "Query")?;
        let state = self.state.read();
        if state.records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        Ok(state
            .backend
            .search(query, top_k)
            .into_iter()
            .filter_map(|(score, pos)| {
                state.records.get(pos).map(|r| ScoredRecord {
                    score,
                    record: r.clone(),
                })
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dir", &self.dir)
            .field("dim", &self.dim)
            .field("len", &self.len())
            .finish()
    }
}
