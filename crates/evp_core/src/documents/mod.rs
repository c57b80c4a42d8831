//! JSON-file document catalog and page/line cache.
//!
//! Raw document parsing lives outside this workspace; the catalog only stores what an
//! ingester hands it. There is no cross-process locking around these files.

pub mod chunking;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::hashing::write_json_atomic;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentInfo {
    pub doc_id: String,
    pub filename: String,
    pub source_path: Option<String>,
    pub page_count: u32,
    pub ingested_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocPages {
    pages: Vec<Vec<String>>,
}

/// Supplies fragmented text (pages of lines) for a known document.
pub trait FragmentSource {
    fn load_fragmented_text(&self, doc_id: &str) -> Result<Option<Vec<Vec<String>>>, AppError>;
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("docs_index.json")
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join("doc_cache")
    }

    fn pages_path(&self, doc_id: &str) -> PathBuf {
        self.cache_dir().join(format!("{doc_id}.json"))
    }

    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.cache_dir()).map_err(|e| {
            AppError::new("DOCS_STORE_IO_FAILED", "Failed to create document store directories")
                .with_details(format!("path={}; err={}", self.cache_dir().display(), e))
        })
    }

    fn read_index(&self) -> Result<BTreeMap<String, DocumentInfo>, AppError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new("DOCS_STORE_READ_FAILED", "Failed to read document index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("DOCS_STORE_DECODE_FAILED", "Failed to decode document index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }

    pub fn upsert_document(&self, doc: DocumentInfo) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let mut index = self.read_index()?;
        index.insert(doc.doc_id.clone(), doc);
        write_json_atomic(&self.index_path(), &index, "DOCS_STORE")
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Option<DocumentInfo>, AppError> {
        Ok(self.read_index()?.remove(doc_id))
    }

    /// Matches on basename, so `uploads/a.txt` and `a.txt` resolve to the same document.
    pub fn find_by_filename(&self, filename: &str) -> Result<Option<DocumentInfo>, AppError> {
        let wanted = basename(filename);
        Ok(self
            .read_index()?
            .into_values()
            .find(|d| basename(&d.filename) == wanted))
    }

    /// Sorted by doc id.
    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>, AppError> {
        Ok(self.read_index()?.into_values().collect())
    }

    pub fn save_doc_lines(&self, doc_id: &str, pages: &[Vec<String>]) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let payload = DocPages {
            pages: pages.to_vec(),
        };
        write_json_atomic(&self.pages_path(doc_id), &payload, "DOCS_STORE")
    }

    pub fn load_doc_lines(&self, doc_id: &str) -> Result<Option<Vec<Vec<String>>>, AppError> {
        let path = self.pages_path(doc_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new("DOCS_STORE_READ_FAILED", "Failed to read document pages")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let pages: DocPages = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("DOCS_STORE_DECODE_FAILED", "Failed to decode document pages")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(Some(pages.pages))
    }
}

impl FragmentSource for DocumentStore {
    fn load_fragmented_text(&self, doc_id: &str) -> Result<Option<Vec<Vec<String>>>, AppError> {
        self.load_doc_lines(doc_id)
    }
}

pub fn basename(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}
