//! Keeps chunks in step with document mutations.
//!
//! The owner of the documents calls these hooks after each create, update
//! or delete. They never fail: RAG bookkeeping errors are logged and the
//! mutation itself is unaffected.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::service::RagService;

/// Best-effort indexing side effects of document mutations.
#[derive(Clone)]
pub struct DocumentSync {
    rag: Arc<RagService>,
}

impl DocumentSync {
    pub fn new(rag: Arc<RagService>) -> Self {
        Self { rag }
    }

    pub async fn on_created(&self, document_id: &str, content: &str) {
        if let Err(e) = self.rag.index_document(document_id, content).await {
            warn!(document_id, error = %e, "Indexing new document failed");
        }
    }

    /// Delete the old chunks and index `current` when the content changed.
    pub async fn on_updated(&self, document_id: &str, previous: &str, current: &str) {
        if previous == current {
            debug!(document_id, "Content unchanged; chunks kept");
            return;
        }
        if let Err(e) = self.rag.reindex_document(document_id, current).await {
            warn!(document_id, error = %e, "Reindexing updated document failed");
        }
    }

    pub async fn on_deleted(&self, document_id: &str) {
        if let Err(e) = self.rag.delete_document_chunks(document_id).await {
            warn!(document_id, error = %e, "Deleting chunks of removed document failed");
        }
    }
}
