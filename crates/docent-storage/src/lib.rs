//! Docent storage crate - the chunk store contract and its backends.
//!
//! Provides the [`ChunkStore`] trait consumed by the RAG orchestrator, a
//! WAL-mode SQLite implementation with migrations, and an in-memory
//! implementation for tests and ephemeral use.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use db::Database;
pub use memory::MemoryChunkStore;
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkStore, ScoredChunk};
