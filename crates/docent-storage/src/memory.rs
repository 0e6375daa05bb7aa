//! In-memory chunk store.
//!
//! Chunks are grouped per document in a `BTreeMap`, so a full scan visits
//! them in (document_id, chunk_index) order, matching the SQLite backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use docent_core::error::DocentError;
use docent_core::types::{Chunk, NewChunk};

use crate::store::{rank_chunks, ChunkStore, ScoredChunk};

/// Thread-safe, non-persistent chunk store.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    documents: RwLock<BTreeMap<String, Vec<Chunk>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<E: std::fmt::Display>(e: E) -> DocentError {
        DocentError::Storage(format!("Lock poisoned: {}", e))
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn create_batch(&self, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, DocentError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| c.assign(now)).collect();

        let mut documents = self.documents.write().map_err(Self::lock_err)?;

        // Validate the whole batch before touching the map.
        for (i, chunk) in chunks.iter().enumerate() {
            let clashes_stored = documents.get(&chunk.document_id).is_some_and(|existing| {
                existing.iter().any(|c| c.chunk_index == chunk.chunk_index)
            });
            let clashes_batch = chunks[..i].iter().any(|c| {
                c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index
            });
            if clashes_stored || clashes_batch {
                return Err(DocentError::Storage(format!(
                    "Duplicate chunk {} for document {}",
                    chunk.chunk_index, chunk.document_id
                )));
            }
        }

        for chunk in &chunks {
            let entry = documents.entry(chunk.document_id.clone()).or_default();
            entry.push(chunk.clone());
            entry.sort_by_key(|c| c.chunk_index);
        }

        Ok(chunks)
    }

    async fn get_by_document_id(&self, document_id: &str) -> Result<Vec<Chunk>, DocentError> {
        let documents = self.documents.read().map_err(Self::lock_err)?;
        Ok(documents.get(document_id).cloned().unwrap_or_default())
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), DocentError> {
        let mut documents = self.documents.write().map_err(Self::lock_err)?;
        documents.remove(document_id);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChunk>, DocentError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let corpus: Vec<Chunk> = {
            let documents = self.documents.read().map_err(Self::lock_err)?;
            documents.values().flatten().cloned().collect()
        };
        Ok(rank_chunks(corpus, query_embedding, top_k, threshold))
    }

    async fn count(&self) -> Result<u64, DocentError> {
        let documents = self.documents.read().map_err(Self::lock_err)?;
        Ok(documents.values().map(|chunks| chunks.len() as u64).sum())
    }
}
