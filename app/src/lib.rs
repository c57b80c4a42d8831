use std::path::{Path, PathBuf};

use evp_core::config::AppConfig;
use evp_core::error::AppError;
use evp_core::hashing::sha256_file_hex;
use evp_retrieval::context::AuditContext;
use evp_retrieval::ingest::{ingest_directory, ingest_text_file, IngestSummary};
use evp_retrieval::pack::manifest::Manifest;
use evp_retrieval::pack::{
    archive_path, build_audit_pack, fetch_manifest, validate_pack_id, verify_pack, PackCounts, PackRequest,
    PackVerification,
};
use evp_retrieval::retrieve::SearchHit;

#[derive(Debug, serde::Serialize)]
pub struct IngestResponse {
    pub documents: Vec<IngestSummary>,
    pub index_len: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, serde::Serialize)]
pub struct CreatePackResponse {
    pub pack_id: String,
    pub archive_path: String,
    pub archive_sha256: String,
    pub index_path: String,
    pub manifest_path: String,
    pub counts: PackCounts,
    pub duration_ms: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct DownloadResponse {
    pub pack_id: String,
    pub archive_path: String,
    pub sha256: String,
    pub bytes: u64,
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

pub fn open_context(config_path: Option<&Path>) -> Result<AuditContext, AppError> {
    AuditContext::open(AppConfig::load(config_path)?)
}

/// A directory ingests every plain-text file beneath it.
pub fn ingest(ctx: &AuditContext, path: &Path) -> Result<IngestResponse, AppError> {
    let documents = if path.is_dir() {
        ingest_directory(ctx, path)?
    } else {
        vec![ingest_text_file(ctx, path)?]
    };
    Ok(IngestResponse {
        documents,
        index_len: ctx.index.len(),
    })
}

pub fn search(ctx: &AuditContext, query: &str, top_k: usize) -> Result<SearchResponse, AppError> {
    let q = query.trim();
    if q.is_empty() {
        return Err(AppError::new("SEARCH_QUERY_INVALID", "Query must not be empty"));
    }
    Ok(SearchResponse {
        query: q.to_string(),
        hits: ctx.search.search(q, top_k)?,
    })
}

pub fn create_pack(ctx: &AuditContext, req: &PackRequest) -> Result<CreatePackResponse, AppError> {
    let res = build_audit_pack(ctx, req)?;
    Ok(CreatePackResponse {
        archive_path: display(&res.archive_path),
        index_path: display(&res.index_path),
        manifest_path: display(&res.manifest_path),
        pack_id: res.pack_id,
        archive_sha256: res.archive_sha256,
        counts: res.counts,
        duration_ms: res.duration_ms,
    })
}

pub fn get_manifest(packs_dir: &Path, pack_id: &str) -> Result<Manifest, AppError> {
    fetch_manifest(packs_dir, pack_id)
}

pub fn download_pack(packs_dir: &Path, pack_id: &str) -> Result<DownloadResponse, AppError> {
    let id = validate_pack_id(pack_id)?;
    let path: PathBuf = archive_path(packs_dir, &id)?;
    let (sha256, bytes) = sha256_file_hex(&path)?;
    Ok(DownloadResponse {
        pack_id: id,
        archive_path: display(&path),
        sha256,
        bytes,
    })
}

pub fn verify(packs_dir: &Path, pack_id: &str) -> Result<PackVerification, AppError> {
    verify_pack(packs_dir, pack_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn context(root: &Path) -> AuditContext {
        let mut cfg = AppConfig::default().rooted(root);
        cfg.embedding_dim = 16;
        AuditContext::open(cfg).expect("context")
    }

    #[test]
    fn ingest_search_pack_download_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let uploads = tmp.path().join("data").join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("spec.txt"), "Tolerance ±0.002 Part P-12345\n").unwrap();

        let ingested = ingest(&ctx, &uploads).unwrap();
        assert_eq!(ingested.documents.len(), 1);
        assert_eq!(ingested.index_len, 1);

        let found = search(&ctx, "  Part ", 3).unwrap();
        assert_eq!(found.query, "Part");
        assert_eq!(found.hits.len(), 1);
        assert_eq!(search(&ctx, " ", 3).unwrap_err().code, "SEARCH_QUERY_INVALID");

        let req = PackRequest {
            query: Some("Part".to_string()),
            ..PackRequest::default()
        };
        let created = create_pack(&ctx, &req).unwrap();
        assert_eq!(created.counts.items, 1);

        let packs = &ctx.config.packs_dir;
        assert_eq!(get_manifest(packs, &created.pack_id).unwrap().rows.len(), 1);
        let dl = download_pack(packs, &created.pack_id).unwrap();
        assert_eq!(dl.sha256, created.archive_sha256);
        assert!(verify(packs, &created.pack_id).unwrap().ok);
    }
}
