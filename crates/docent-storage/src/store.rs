//! The chunk store contract.

use async_trait::async_trait;

use docent_core::error::DocentError;
use docent_core::types::{Chunk, NewChunk};
use docent_vector::similarity::top_k_by_similarity;

/// A chunk returned from [`ChunkStore::search`] with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Persistence and retrieval of chunks.
///
/// Implementations own their concurrency control; callers add no locking.
/// `search` is defined only by the ranked results it returns, so a backend may
/// answer it with a linear scan or an approximate index.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert all chunks, assigning missing ids and timestamps.
    ///
    /// The batch succeeds or fails as a whole. An empty batch is a no-op.
    async fn create_batch(&self, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, DocentError>;

    /// All chunks of a document ordered by `chunk_index`; empty if none.
    async fn get_by_document_id(&self, document_id: &str) -> Result<Vec<Chunk>, DocentError>;

    /// Remove every chunk of a document. Succeeds when there are none.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), DocentError>;

    /// Rank stored chunks against `query_embedding`.
    ///
    /// Returns at most `top_k` chunks scoring at least `threshold`, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredChunk>, DocentError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<u64, DocentError>;
}

/// Brute-force ranking shared by the bundled backends.
///
/// `corpus` must be in a stable order; it decides how equal scores are broken.
pub(crate) fn rank_chunks(
    corpus: Vec<Chunk>,
    query_embedding: &[f32],
    top_k: usize,
    threshold: f64,
) -> Vec<ScoredChunk> {
    let hits = {
        let embeddings: Vec<&[f32]> = corpus.iter().map(|c| c.embedding.as_slice()).collect();
        top_k_by_similarity(query_embedding, &embeddings, top_k, threshold)
    };

    let mut slots: Vec<Option<Chunk>> = corpus.into_iter().map(Some).collect();
    hits.into_iter()
        .filter_map(|hit| {
            slots[hit.index].take().map(|chunk| ScoredChunk {
                chunk,
                score: hit.score,
            })
        })
        .collect()
}
