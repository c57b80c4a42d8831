use std::fs;
use std::path::{Path, PathBuf};

use evp_core::clock::now_rfc3339_utc;
use evp_core::documents::chunking::{chunk_lines, split_pages};
use evp_core::documents::DocumentInfo;
use evp_core::error::AppError;
use evp_core::hashing::sha256_hex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::AuditContext;
use crate::embeddings::embed_batch;
use crate::index::FragmentMeta;

/// Whitespace-token budget per fragment.
pub const MAX_FRAGMENT_TOKENS: usize = 500;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "text"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub doc_id: String,
    pub filename: String,
    pub pages: usize,
    pub fragments: usize,
    pub record_ids: Vec<u64>,
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .is_some_and(|x| TEXT_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
}

/// Document id: first 40 hex chars of SHA-256 over the absolute path.
pub fn doc_id_for_path(abs: &Path) -> String {
    let digest = sha256_hex(abs.to_string_lossy().as_bytes());
    digest[..40].to_string()
}

/// Ingests one plain-text file: pages on form feed, line-preserving fragments, then
/// catalog, page cache and index in that order. Re-ingesting appends new records.
pub fn ingest_text_file(ctx: &AuditContext, path: &Path) -> Result<IngestSummary, AppError> {
    if !path.is_file() {
        return Err(AppError::new("INGEST_FILE_NOT_FOUND", "File to ingest not found")
            .with_details(format!("path={}", path.display())));
    }
    if !is_text_file(path) {
        return Err(AppError::new("INGEST_FILE_TYPE_INVALID", "Only plain-text files can be ingested")
            .with_details(format!("path={}", path.display())));
    }
    let abs = fs::canonicalize(path).map_err(|e| {
        AppError::new("INGEST_FILE_READ_FAILED", "Failed to resolve file path")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let bytes = fs::read(&abs).map_err(|e| {
        AppError::new("INGEST_FILE_READ_FAILED", "Failed to read file")
            .with_details(format!("path={}; err={}", abs.display(), e))
    })?;
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %abs.display(), "file is not valid UTF-8; invalid sequences replaced");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    let filename = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| abs.to_string_lossy().into_owned());
    let doc_id = doc_id_for_path(&abs);
    let pages = split_pages(&text);

    ctx.documents.save_doc_lines(&doc_id, &pages)?;
    ctx.documents.upsert_document(DocumentInfo {
        doc_id: doc_id.clone(),
        filename: filename.clone(),
        source_path: Some(abs.to_string_lossy().into_owned()),
        page_count: pages.len() as u32,
        ingested_at: now_rfc3339_utc()?,
    })?;

    let mut metas = Vec::new();
    for (p_idx, lines) in pages.iter().enumerate() {
        for frag in chunk_lines(lines, MAX_FRAGMENT_TOKENS) {
            metas.push(FragmentMeta {
                doc_id: doc_id.clone(),
                filename: filename.clone(),
                page_number: p_idx as u32 + 1,
                line_start: frag.line_start,
                line_end: frag.line_end,
                text: frag.text,
            });
        }
    }
    let texts: Vec<String> = metas.iter().map(|m| m.text.clone()).collect();
    let vectors = embed_batch(ctx.search.embedder().as_ref(), &texts)?;
    let fragments = metas.len();
    let record_ids = ctx.index.add(vectors, metas)?;

    info!(filename = %filename, doc_id = %doc_id, pages = pages.len(), fragments, "document ingested");
    Ok(IngestSummary {
        doc_id,
        filename,
        pages: pages.len(),
        fragments,
        record_ids,
    })
}

/// Ingests every plain-text file under `dir` in sorted path order. Per-file failures
/// are logged and skipped.
pub fn ingest_directory(ctx: &AuditContext, dir: &Path) -> Result<Vec<IngestSummary>, AppError> {
    fn walk(dir: &Path, acc: &mut Vec<PathBuf>) -> Result<(), AppError> {
        let rd = fs::read_dir(dir).map_err(|e| {
            AppError::new("INGEST_DIR_READ_FAILED", "Failed to read directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        for entry in rd {
            let p = entry
                .map_err(|e| {
                    AppError::new("INGEST_DIR_READ_FAILED", "Failed to read directory entry")
                        .with_details(format!("path={}; err={}", dir.display(), e))
                })?
                .path();
            if p.is_dir() {
                walk(&p, acc)?;
            } else if is_text_file(&p) {
                acc.push(p);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();

    let mut out = Vec::new();
    for f in files {
        match ingest_text_file(ctx, &f) {
            Ok(s) => out.push(s),
            Err(e) => warn!(path = %f.display(), code = %e.code, error = %e, "skipping file that failed to ingest"),
        }
    }
    Ok(out)
}
