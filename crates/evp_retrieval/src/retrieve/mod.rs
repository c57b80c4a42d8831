use std::sync::Arc;

use evp_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embeddings::Embedder;
use crate::index::VectorIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub filename: String,
    pub page_number: u32,
    pub line_start: u32,
    pub line_end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub text: String,
    pub citation: Citation,
    pub doc_id: String,
    pub record_id: u64,
}

/// Embeds the query text and ranks it against the shared index.
#[derive(Clone)]
pub struct SearchEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, AppError> {
        let qv = self.embedder.embed(query)?;
        let hits: Vec<SearchHit> = self
            .index
            .search(&qv, top_k)?
            .into_iter()
            .map(|s| SearchHit {
                score: s.score,
                citation: Citation {
                    filename: s.record.filename,
                    page_number: s.record.page_number,
                    line_start: s.record.line_start,
                    line_end: s.record.line_end,
                },
                text: s.record.text,
                doc_id: s.record.doc_id,
                record_id: s.record.id,
            })
            .collect();

        info!(query_chars = query.chars().count(), top_k, hits = hits.len(), "search completed");
        Ok(hits)
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("index", &self.index)
            .field("embedder_dim", &self.embedder.dim())
            .finish()
    }
}
