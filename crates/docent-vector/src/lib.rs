//! Docent vector crate - chunking, similarity math, and embedding providers.
//!
//! Provides the word-window chunker used at indexing time, pure cosine /
//! Euclidean helpers with brute-force top-K ranking, and an embedding
//! service trait with an OpenAI-compatible client and a deterministic mock.

pub mod chunker;
pub mod embedding;
pub mod similarity;

pub use chunker::{ChunkPiece, Chunker};
pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OpenAiEmbeddingService};
pub use similarity::{cosine_similarity, euclidean_distance, normalize, top_k_by_similarity, ScoredIndex};
