use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Chunks
// =============================================================================

/// A stored slice of a document's text together with its embedding.
///
/// Chunks are immutable once created: a document's chunks are only ever
/// bulk-created or bulk-deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier.
    pub id: Uuid,
    /// Identifier of the owning (external) document.
    pub document_id: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: u32,
    /// The chunk text.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
    /// When the chunk was stored.
    pub created_at: DateTime<Utc>,
}

/// A chunk awaiting insertion.
///
/// The store assigns `id` and `created_at` when they are absent.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChunk {
    pub id: Option<Uuid>,
    pub document_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewChunk {
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: u32,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: None,
            document_id: document_id.into(),
            chunk_index,
            content: content.into(),
            embedding,
            created_at: None,
        }
    }

    /// Fill in any missing identifier or timestamp and produce a stored chunk.
    pub fn assign(self, now: DateTime<Utc>) -> Chunk {
        Chunk {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            content: self.content,
            embedding: self.embedding,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

// =============================================================================
// Queries and responses
// =============================================================================

/// A question asked against the indexed corpus.
///
/// Non-positive `top_k` and `threshold` values mean "use the configured
/// default".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub top_k: i64,
    pub threshold: f64,
}

impl Query {
    /// A query that relies on the configured `top_k` and `threshold`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 0,
            threshold: 0.0,
        }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// The answer to a [`Query`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated (or degraded-mode) answer text.
    pub answer: String,
    /// Retrieved chunks in ranked order.
    pub relevant_chunks: Vec<Chunk>,
    /// Heuristic support indicator, not a calibrated probability.
    pub confidence_score: f64,
    /// Wall-clock time spent answering.
    pub processing_time_ms: u64,
}

/// Inbound query payload as sent by an upstream caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl From<QueryRequest> for Query {
    fn from(req: QueryRequest) -> Self {
        Query {
            text: req.query,
            top_k: req.top_k.unwrap_or(0),
            threshold: req.threshold.unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_chunk_assign_fills_missing_fields() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let chunk = NewChunk::new("doc-1", 3, "hello", vec![1.0, 0.0]).assign(now);

        assert!(!chunk.id.is_nil());
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.chunk_index, 3);
        assert_eq!(chunk.created_at, now);
    }

    #[test]
    fn test_new_chunk_assign_keeps_existing_fields() {
        let id = Uuid::new_v4();
        let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let mut draft = NewChunk::new("doc-1", 0, "hello", vec![]);
        draft.id = Some(id);
        draft.created_at = Some(created);

        let chunk = draft.assign(now);
        assert_eq!(chunk.id, id);
        assert_eq!(chunk.created_at, created);
    }

    #[test]
    fn test_query_request_defaults_to_zero() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "what is rust?"}"#).unwrap();
        let query = Query::from(req);
        assert_eq!(query.text, "what is rust?");
        assert_eq!(query.top_k, 0);
        assert_eq!(query.threshold, 0.0);
    }

    #[test]
    fn test_query_request_explicit_values() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query": "q", "top_k": 3, "threshold": 0.5}"#).unwrap();
        let query = Query::from(req);
        assert_eq!(query.top_k, 3);
        assert_eq!(query.threshold, 0.5);
    }

    #[test]
    fn test_response_wire_shape() {
        let chunk = NewChunk::new("doc-9", 0, "text", vec![0.5]).assign(Utc::now());
        let response = Response {
            answer: "42".to_string(),
            relevant_chunks: vec![chunk],
            confidence_score: 0.85,
            processing_time_ms: 12,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["answer"], "42");
        assert_eq!(value["confidence_score"], 0.85);
        assert_eq!(value["processing_time_ms"], 12);
        let first = &value["relevant_chunks"][0];
        for key in ["id", "document_id", "chunk_index", "content", "embedding", "created_at"] {
            assert!(first.get(key).is_some(), "missing key {}", key);
        }
    }
}
