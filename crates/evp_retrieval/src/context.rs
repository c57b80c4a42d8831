use std::sync::Arc;

use evp_core::config::AppConfig;
use evp_core::documents::DocumentStore;
use evp_core::error::AppError;
use evp_core::provenance::{DraftDirProvenance, ProvenanceSource};

use crate::embeddings::{Embedder, HashEmbedder};
use crate::index::VectorIndex;
use crate::retrieve::SearchEngine;

/// Everything a pack build or search needs, opened once and passed explicitly.
pub struct AuditContext {
    pub config: AppConfig,
    pub index: Arc<VectorIndex>,
    pub search: SearchEngine,
    pub documents: DocumentStore,
    pub provenance: Arc<dyn ProvenanceSource>,
}

impl AuditContext {
    /// Default collaborators: hash embedder and draft-directory provenance.
    pub fn open(config: AppConfig) -> Result<Self, AppError> {
        let embedder = Arc::new(HashEmbedder::new(config.embedding_dim));
        let provenance = Arc::new(DraftDirProvenance::open(config.drafts_dir.clone()));
        Self::with_parts(config, embedder, provenance)
    }

    pub fn with_parts(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        provenance: Arc<dyn ProvenanceSource>,
    ) -> Result<Self, AppError> {
        if embedder.dim() != config.embedding_dim {
            return Err(AppError::new(
                "INDEX_DIMENSION_MISMATCH",
                "Embedder dimension does not match configured embedding dimension",
            )
            .with_details(format!("embedder={}; configured={}", embedder.dim(), config.embedding_dim)));
        }
        let index = Arc::new(VectorIndex::open(
            config.index_dir(),
            config.embedding_dim,
            config.index_backend,
        )?);
        let search = SearchEngine::new(index.clone(), embedder);
        let documents = DocumentStore::open(config.storage_dir.clone());
        Ok(Self {
            config,
            index,
            search,
            documents,
            provenance,
        })
    }
}
