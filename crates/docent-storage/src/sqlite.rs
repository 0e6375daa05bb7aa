//! SQLite-backed chunk store.
//!
//! Blocking rusqlite calls run on tokio's blocking pool so the store can be
//! awaited (and timed out) like any other external call. Dropping a call's
//! future before it gets the connection cancels it: the blocking task sees
//! the abandoned flag and does nothing, and an abandoned batch is rolled
//! back instead of committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;
use uuid::Uuid;

use docent_core::error::DocentError;
use docent_core::types::{Chunk, NewChunk};

use crate::db::Database;
use crate::store::{rank_chunks, ChunkStore, ScoredChunk};

const SELECT_COLUMNS: &str =
    "SELECT id, document_id, chunk_index, content, embedding, created_at FROM chunks";

/// How long a call waits for the connection unless configured otherwise.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Set once the caller has stopped awaiting an operation.
#[derive(Clone, Default)]
struct Abandoned(Arc<AtomicBool>);

impl Abandoned {
    fn check(&self) -> Result<(), DocentError> {
        if self.0.load(Ordering::Acquire) {
            return Err(DocentError::Storage(
                "Operation abandoned by its caller".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raises the [`Abandoned`] flag when the awaiting future is dropped.
struct AbandonOnDrop(Abandoned);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0 .0.store(true, Ordering::Release);
    }
}

/// Chunk store persisting to a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteChunkStore {
    db: Arc<Database>,
    lock_timeout: Duration,
}

impl SqliteChunkStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound how long a call waits for the shared connection before
    /// failing with [`DocentError::Timeout`].
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// `f` only starts while the caller is still waiting; write paths must
    /// call [`Abandoned::check`] again right before committing.
    async fn blocking<F, T>(&self, f: F) -> Result<T, DocentError>
    where
        F: FnOnce(&Connection, &Abandoned) -> Result<T, DocentError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let wait = self.lock_timeout;
        let abandoned = Abandoned::default();
        let _guard = AbandonOnDrop(abandoned.clone());

        tokio::task::spawn_blocking(move || {
            db.with_conn_timeout(wait, |conn| {
                if let Err(e) = abandoned.check() {
                    debug!("Storage call abandoned before it started");
                    return Err(e);
                }
                f(conn, &abandoned)
            })
        })
        .await
        .map_err(|e| DocentError::Storage(format!("Storage task panicked: {}", e)))?
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn create_batch(&self, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, DocentError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| c.assign(now)).collect();

        self.blocking(move |conn, abandoned| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DocentError::Storage(format!("Failed to begin batch: {}", e)))?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO chunks (id, document_id, chunk_index, content, embedding, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
                for chunk in &chunks {
                    stmt.execute(params![
                        chunk.id.to_string(),
                        chunk.document_id,
                        chunk.chunk_index,
                        chunk.content,
                        encode_embedding(&chunk.embedding),
                        chunk.created_at.timestamp_millis(),
                    ])
                    .map_err(|e| DocentError::Storage(format!("Failed to insert chunk batch: {}", e)))?;
                }
            }
            abandoned.check()?;
            tx.commit()
                .map_err(|e| DocentError::Storage(format!("Failed to commit batch: {}", e)))?;
            debug!(count = chunks.len(), "Chunk batch inserted");
            Ok(chunks)
        })
        .await
    }

    async fn get_by_document_id(&self, document_id: &str) -> Result<Vec<Chunk>, DocentError> {
        let document_id = document_id.to_string();
        self.blocking(move |conn, _| {
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE document_id = ?1 ORDER BY chunk_index",
                    SELECT_COLUMNS
                ))
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![document_id], |row| Ok(row_to_chunk(row)))
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            collect_rows(rows)
        })
        .await
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), DocentError> {
        let document_id = document_id.to_string();
        self.blocking(move |conn, _| {
            let removed = conn
                .execute(
                    "DELETE FROM chunks WHERE document_id = ?1",
                    params![document_id],
                )
                .map_err(|e| DocentError::Storage(format!("Failed to delete chunks: {}", e)))?;
            debug!(document_id = %document_id, removed, "Chunks deleted");
            Ok(())
        })
        .await
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

        let corpus = self
            .blocking(|conn, _| {
                let mut stmt = conn
                    .prepare(&format!("{} ORDER BY document_id, chunk_index", SELECT_COLUMNS))
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_chunk(row)))
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
                collect_rows(rows)
            })
            .await?;

        let scanned = corpus.len();
        let ranked = rank_chunks(corpus, query_embedding, top_k, threshold);
        debug!(scanned, returned = ranked.len(), "Brute-force chunk search");
        Ok(ranked)
    }

    async fn count(&self) -> Result<u64, DocentError> {
        self.blocking(|conn, _| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
        .await
    }
}

fn collect_rows<I>(rows: I) -> Result<Vec<Chunk>, DocentError>
where
    I: Iterator<Item = rusqlite::Result<Result<Chunk, DocentError>>>,
{
    let mut chunks = Vec::new();
    for row in rows {
        let chunk = row.map_err(|e| DocentError::Storage(e.to_string()))??;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn row_to_chunk(row: &Row<'_>) -> Result<Chunk, DocentError> {
    let id: String = row.get(0).map_err(|e| DocentError::Storage(e.to_string()))?;
    let document_id: String = row.get(1).map_err(|e| DocentError::Storage(e.to_string()))?;
    let chunk_index: u32 = row.get(2).map_err(|e| DocentError::Storage(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| DocentError::Storage(e.to_string()))?;
    let embedding: Vec<u8> = row.get(4).map_err(|e| DocentError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(5).map_err(|e| DocentError::Storage(e.to_string()))?;

    Ok(Chunk {
        id: Uuid::parse_str(&id)
            .map_err(|e| DocentError::Storage(format!("Invalid chunk id {}: {}", id, e)))?,
        document_id,
        chunk_index,
        content,
        embedding: decode_embedding(&embedding)?,
        created_at: millis_to_datetime(created_at)?,
    })
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, DocentError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DocentError::Storage(format!("Invalid timestamp: {}", ms)))
}

/// Serialize an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`].
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, DocentError> {
    if bytes.len() % 4 != 0 {
        return Err(DocentError::Storage(format!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
