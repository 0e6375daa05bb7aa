//! The RAG orchestrator.
//!
//! [`RagService`] is stateless apart from its injected backends. Which
//! operations it can perform is decided once, in [`RagService::new`], and
//! reported by [`RagService::capabilities`]; a missing backend yields the
//! documented degraded response or no-op rather than an error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use docent_core::config::DocentConfig;
use docent_core::error::DocentError;
use docent_core::types::{NewChunk, Query, Response};
use docent_storage::ChunkStore;
use docent_vector::{Chunker, DynEmbeddingService};

use crate::error::RagError;
use crate::generation::{CompletionOptions, DynChatModel};
use crate::prompt;

/// Answer returned when the query path lacks a backend.
pub const NOT_CONFIGURED_ANSWER: &str =
    "RAG service is not configured: an embedding provider, chunk store and chat model are required.";

/// Answer returned when no chunk clears the similarity threshold.
pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant information in the indexed documents to answer your question.";

const CONFIDENCE_DEFAULT: f64 = 0.85;
const CONFIDENCE_SPARSE: f64 = 0.60;

/// Collaborators injected into a [`RagService`]. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Backends {
    pub embedder: Option<Arc<dyn DynEmbeddingService>>,
    pub generator: Option<Arc<dyn DynChatModel>>,
    pub store: Option<Arc<dyn ChunkStore>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn DynEmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn DynChatModel>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }
}

/// Operations a [`RagService`] can actually perform with its backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Capabilities {
    /// Embedder, chat model and store are all present.
    pub can_query: bool,
    /// Embedder and store are present.
    pub can_index: bool,
    /// Store is present.
    pub can_delete: bool,
}

/// Why [`RagService::index_document`] stored nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    EmptyContent,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotConfigured => write!(f, "indexing is not configured"),
            SkipReason::EmptyContent => write!(f, "document has no content"),
        }
    }
}

/// Result of indexing one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Chunks were embedded; `skipped` counts chunks whose embedding failed.
    Indexed { stored: usize, skipped: usize },
    /// Nothing was attempted.
    Skipped { reason: SkipReason },
}

/// Retrieval-augmented question answering over stored chunks.
pub struct RagService {
    embedder: Option<Arc<dyn DynEmbeddingService>>,
    generator: Option<Arc<dyn DynChatModel>>,
    store: Option<Arc<dyn ChunkStore>>,
    capabilities: Capabilities,
    chunker: Chunker,
    default_top_k: usize,
    default_threshold: f64,
    embed_concurrency: usize,
    request_timeout: Duration,
    completion: CompletionOptions,
}

impl RagService {
    pub fn new(config: &DocentConfig, backends: Backends) -> Self {
        let Backends {
            embedder,
            generator,
            store,
        } = backends;

        let capabilities = Capabilities {
            can_query: embedder.is_some() && generator.is_some() && store.is_some(),
            can_index: embedder.is_some() && store.is_some(),
            can_delete: store.is_some(),
        };

        if !capabilities.can_query {
            warn!(
                embedder = embedder.is_some(),
                generator = generator.is_some(),
                store = store.is_some(),
                "RAG backends incomplete; queries will return the not-configured answer"
            );
        }
        if !capabilities.can_index {
            warn!("Indexing disabled: embedding provider or chunk store missing");
        }

        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        info!(
            chunk_size = chunker.chunk_size(),
            chunk_overlap = chunker.chunk_overlap(),
            embedder = embedder.as_ref().map(|e| e.model_name()).unwrap_or("none"),
            generator = generator.as_ref().map(|g| g.model_name()).unwrap_or("none"),
            "RAG service ready"
        );

        Self {
            embedder,
            generator,
            store,
            capabilities,
            chunker,
            default_top_k: config.query.top_k.max(1),
            default_threshold: config.query.threshold,
            embed_concurrency: config.indexing.embed_concurrency.max(1),
            request_timeout: config.request_timeout(),
            completion: CompletionOptions {
                temperature: Some(config.generation.temperature),
                max_tokens: Some(config.generation.max_tokens),
            },
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Answer a question from the indexed corpus.
    pub async fn query(&self, query: Query) -> Result<Response, RagError> {
        let started = Instant::now();

        if query.text.is_empty() {
            return Err(RagError::InvalidQuery);
        }

        let top_k = if query.top_k > 0 {
            query.top_k as usize
        } else {
            self.default_top_k
        };
        let threshold = if query.threshold > 0.0 {
            query.threshold
        } else {
            self.default_threshold
        };

        let (embedder, generator, store) = match (&self.embedder, &self.generator, &self.store) {
            (Some(e), Some(g), Some(s)) => (e, g, s),
            _ => {
                debug!("Query answered in not-configured mode");
                return Ok(Response {
                    answer: NOT_CONFIGURED_ANSWER.to_string(),
                    relevant_chunks: Vec::new(),
                    confidence_score: 0.0,
                    processing_time_ms: elapsed_ms(started),
                });
            }
        };

        let embedding = with_deadline(self.request_timeout, embedder.embed_boxed(&query.text))
            .await
            .map_err(|e| RagError::provider("embedding", e))?;

        let hits = with_deadline(self.request_timeout, store.search(&embedding, top_k, threshold))
            .await
            .map_err(|e| RagError::store("search", e))?;

        if hits.is_empty() {
            info!(top_k, threshold, found = 0, "No relevant chunks for query");
            return Ok(Response {
                answer: NO_RESULTS_ANSWER.to_string(),
                relevant_chunks: Vec::new(),
                confidence_score: 0.0,
                processing_time_ms: elapsed_ms(started),
            });
        }

        for hit in &hits {
            debug!(
                document_id = %hit.chunk.document_id,
                chunk_index = hit.chunk.chunk_index,
                score = hit.score,
                "Retrieved chunk"
            );
        }
        let chunks: Vec<_> = hits.into_iter().map(|hit| hit.chunk).collect();

        let messages = prompt::build_messages(&query.text, &chunks);
        let answer = with_deadline(
            self.request_timeout,
            generator.complete_boxed(&messages, &self.completion),
        )
        .await
        .map_err(|e| RagError::provider("generation", e))?;

        let found = chunks.len();
        let confidence_score = if found < top_k / 2 {
            CONFIDENCE_SPARSE
        } else {
            CONFIDENCE_DEFAULT
        };

        let processing_time_ms = elapsed_ms(started);
        info!(top_k, found, elapsed_ms = processing_time_ms, "Query answered");

        Ok(Response {
            answer,
            relevant_chunks: chunks,
            confidence_score,
            processing_time_ms,
        })
    }

    /// [`query`](Self::query) bounded by a caller-supplied deadline.
    pub async fn query_within(&self, query: Query, deadline: Duration) -> Result<Response, RagError> {
        tokio::time::timeout(deadline, self.query(query))
            .await
            .map_err(|_| RagError::Timeout {
                stage: "query",
                after: deadline,
            })?
    }

    /// Chunk, embed and store a document.
    ///
    /// Chunks whose embedding fails are logged and left out; the survivors
    /// are stored with consecutive indices from 0. Only a failed insert is
    /// an error.
    pub async fn index_document(
        &self,
        document_id: &str,
        content: &str,
    ) -> Result<IndexOutcome, RagError> {
        let (embedder, store) = match (&self.embedder, &self.store) {
            (Some(e), Some(s)) => (e.as_ref(), s),
            _ => {
                debug!(document_id, "Indexing skipped: not configured");
                return Ok(IndexOutcome::Skipped {
                    reason: SkipReason::NotConfigured,
                });
            }
        };

        let pieces = self.chunker.chunk(content);
        if pieces.is_empty() {
            debug!(document_id, "Indexing skipped: empty content");
            return Ok(IndexOutcome::Skipped {
                reason: SkipReason::EmptyContent,
            });
        }

        let timeout = self.request_timeout;
        let embedded: Vec<(usize, String, Result<Vec<f32>, DocentError>)> =
            stream::iter(pieces.into_iter().enumerate())
                .map(move |(position, text)| async move {
                    let result = with_deadline(timeout, embedder.embed_boxed(&text)).await;
                    (position, text, result)
                })
                .buffered(self.embed_concurrency)
                .collect()
                .await;

        let mut survivors = Vec::with_capacity(embedded.len());
        let mut skipped = 0usize;
        for (position, text, result) in embedded {
            match result {
                Ok(embedding) => {
                    let chunk_index = survivors.len() as u32;
                    survivors.push(NewChunk::new(document_id, chunk_index, text, embedding));
                }
                Err(e) => {
                    warn!(
                        document_id,
                        chunk_index = position,
                        error = %e,
                        "Chunk embedding failed; skipping chunk"
                    );
                    skipped += 1;
                }
            }
        }

        if survivors.is_empty() {
            warn!(document_id, skipped, "No chunk embeddings succeeded; nothing stored");
            return Ok(IndexOutcome::Indexed { stored: 0, skipped });
        }

        let stored = with_deadline(timeout, store.create_batch(survivors))
            .await
            .map_err(|e| RagError::store("insert", e))?
            .len();

        info!(document_id, stored, skipped, "Document indexed");
        Ok(IndexOutcome::Indexed { stored, skipped })
    }

    /// Remove every chunk of a document. A no-op without a store.
    pub async fn delete_document_chunks(&self, document_id: &str) -> Result<(), RagError> {
        let Some(store) = &self.store else {
            debug!(document_id, "Chunk deletion skipped: no store");
            return Ok(());
        };

        with_deadline(self.request_timeout, store.delete_by_document_id(document_id))
            .await
            .map_err(|e| RagError::store("delete", e))?;

        info!(document_id, "Document chunks deleted");
        Ok(())
    }

    /// Replace a document's chunks with chunks of `content`.
    ///
    /// Old chunks are deleted first; new ones are indexed only when
    /// `content` is non-empty. The two steps are not atomic: if indexing
    /// fails the document is left without chunks until the next reindex.
    pub async fn reindex_document(
        &self,
        document_id: &str,
        content: &str,
    ) -> Result<IndexOutcome, RagError> {
        self.delete_document_chunks(document_id).await?;

        if content.trim().is_empty() {
            return Ok(IndexOutcome::Skipped {
                reason: SkipReason::EmptyContent,
            });
        }
        self.index_document(document_id, content).await
    }
}

async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, DocentError>
where
    F: Future<Output = Result<T, DocentError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DocentError::Timeout(limit)),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use docent_core::types::Chunk;
    use docent_storage::{MemoryChunkStore, ScoredChunk};
    use docent_vector::{EmbeddingService, MockEmbedding};

    use crate::generation::MockChatModel;

    /// Fails on any text containing `marker`, otherwise defers to the mock.
    struct SelectiveEmbedder {
        marker: &'static str,
        inner: MockEmbedding,
    }

    impl EmbeddingService for SelectiveEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, DocentError> {
            if text.contains(self.marker) {
                return Err(DocentError::Provider("rate limited".to_string()));
            }
            self.inner.embed(text).await
        }

        fn model_name(&self) -> &str {
            "selective"
        }
    }

    /// A store that cannot be reached.
    struct UnavailableStore;

    #[async_trait]
    impl ChunkStore for UnavailableStore {
        async fn create_batch(&self, _chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, DocentError> {
            Err(DocentError::Storage("database is locked".to_string()))
        }

        async fn get_by_document_id(&self, _document_id: &str) -> Result<Vec<Chunk>, DocentError> {
            Err(DocentError::Storage("database is locked".to_string()))
        }

        async fn delete_by_document_id(&self, _document_id: &str) -> Result<(), DocentError> {
            Err(DocentError::Storage("database is locked".to_string()))
        }

        async fn search(
            &self,
            _query_embedding: &[f32],
            _top_k: usize,
            _threshold: f64,
        ) -> Result<Vec<ScoredChunk>, DocentError> {
            Err(DocentError::Storage("database is locked".to_string()))
        }

        async fn count(&self) -> Result<u64, DocentError> {
            Err(DocentError::Storage("database is locked".to_string()))
        }
    }

    struct SlowEmbedder;

    impl EmbeddingService for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, DocentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![1.0])
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn small_chunks_config() -> DocentConfig {
        let mut config = DocentConfig::default();
        config.chunking.chunk_size = 4;
        config.chunking.chunk_overlap = 0;
        config
    }

    fn full_service(config: &DocentConfig) -> (RagService, Arc<MemoryChunkStore>, MockChatModel) {
        let store = Arc::new(MemoryChunkStore::new());
        let chat = MockChatModel::new();
        let service = RagService::new(
            config,
            Backends::new()
                .with_embedder(Arc::new(MockEmbedding::new()))
                .with_generator(Arc::new(chat.clone()))
                .with_store(store.clone()),
        );
        (service, store, chat)
    }

    #[test]
    fn test_capabilities_resolved_once() {
        let config = DocentConfig::default();
        let none = RagService::new(&config, Backends::new());
        assert_eq!(
            none.capabilities(),
            Capabilities {
                can_query: false,
                can_index: false,
                can_delete: false
            }
        );

        let index_only = RagService::new(
            &config,
            Backends::new()
                .with_embedder(Arc::new(MockEmbedding::new()))
                .with_store(Arc::new(MemoryChunkStore::new())),
        );
        assert_eq!(
            index_only.capabilities(),
            Capabilities {
                can_query: false,
                can_index: true,
                can_delete: true
            }
        );

        let (full, _, _) = full_service(&config);
        assert!(full.capabilities().can_query);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_config_check() {
        let service = RagService::new(&DocentConfig::default(), Backends::new());
        let err = service.query(Query::new("")).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidQuery));
    }

    #[tokio::test]
    async fn test_missing_generator_gives_not_configured_answer() {
        let service = RagService::new(
            &DocentConfig::default(),
            Backends::new()
                .with_embedder(Arc::new(MockEmbedding::new()))
                .with_store(Arc::new(MemoryChunkStore::new())),
        );
        let response = service.query(Query::new("anything")).await.unwrap();
        assert_eq!(response.answer, NOT_CONFIGURED_ANSWER);
        assert!(response.relevant_chunks.is_empty());
        assert_eq!(response.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn test_no_hits_gives_no_results_answer() {
        let (service, _, chat) = full_service(&DocentConfig::default());
        let response = service.query(Query::new("nothing indexed")).await.unwrap();
        assert_eq!(response.answer, NO_RESULTS_ANSWER);
        assert_eq!(response.confidence_score, 0.0);
        assert!(chat.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_query_answers_from_matching_chunk() {
        let config = small_chunks_config();
        let (service, _, chat) = full_service(&config);
        service
            .index_document("doc-1", "alpha beta gamma delta epsilon zeta eta theta")
            .await
            .unwrap();

        let response = service
            .query(Query::new("alpha beta gamma delta").with_top_k(2))
            .await
            .unwrap();

        assert_eq!(response.relevant_chunks.len(), 1);
        assert_eq!(response.relevant_chunks[0].chunk_index, 0);
        assert_eq!(response.answer, "Answer drawn from 1 source(s).");
        // found = 1, top_k / 2 = 1
        assert_eq!(response.confidence_score, 0.85);

        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0][1].content.contains("[Source 1]\nalpha beta gamma delta"));
    }

    #[tokio::test]
    async fn test_sparse_results_lower_confidence() {
        let config = small_chunks_config();
        let (service, _, _) = full_service(&config);
        service
            .index_document("doc-1", "one two three four")
            .await
            .unwrap();

        let response = service
            .query(Query::new("one two three four").with_top_k(4))
            .await
            .unwrap();
        assert_eq!(response.relevant_chunks.len(), 1);
        assert_eq!(response.confidence_score, 0.60);
    }

    #[tokio::test]
    async fn test_index_skips_failed_chunks_and_renumbers() {
        let config = small_chunks_config();
        let store = Arc::new(MemoryChunkStore::new());
        let service = RagService::new(
            &config,
            Backends::new()
                .with_embedder(Arc::new(SelectiveEmbedder {
                    marker: "poison",
                    inner: MockEmbedding::new(),
                }))
                .with_store(store.clone()),
        );

        let outcome = service
            .index_document("doc-1", "a b c d poison e f g h i j k")
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { stored: 2, skipped: 1 });

        let chunks = store.get_by_document_id("doc-1").await.unwrap();
        let layout: Vec<(u32, &str)> = chunks
            .iter()
            .map(|c| (c.chunk_index, c.content.as_str()))
            .collect();
        assert_eq!(layout, vec![(0, "a b c d"), (1, "h i j k")]);
    }

    #[tokio::test]
    async fn test_concurrent_embedding_keeps_chunk_order() {
        let mut config = small_chunks_config();
        config.chunking.chunk_size = 1;
        config.indexing.embed_concurrency = 4;
        let (service, store, _) = full_service(&config);

        let words: Vec<String> = (0..20).map(|i| format!("w{}", i)).collect();
        service
            .index_document("doc-1", &words.join(" "))
            .await
            .unwrap();

        let stored: Vec<String> = store
            .get_by_document_id("doc-1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect();
        assert_eq!(stored, words);
    }

    #[tokio::test]
    async fn test_index_without_backends_is_noop() {
        let service = RagService::new(&DocentConfig::default(), Backends::new());
        let outcome = service.index_document("doc-1", "some text").await.unwrap();
        assert_eq!(
            outcome,
            IndexOutcome::Skipped {
                reason: SkipReason::NotConfigured
            }
        );
        service.delete_document_chunks("doc-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_index_empty_content_is_noop() {
        let (service, store, _) = full_service(&DocentConfig::default());
        let outcome = service.index_document("doc-1", "  \n ").await.unwrap();
        assert_eq!(
            outcome,
            IndexOutcome::Skipped {
                reason: SkipReason::EmptyContent
            }
        );
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reindex_to_empty_content_clears_chunks() {
        let (service, store, _) = full_service(&DocentConfig::default());
        service.index_document("doc-1", "first version").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let outcome = service.reindex_document("doc-1", "").await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Skipped { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_embedding_times_out() {
        let mut config = DocentConfig::default();
        config.timeouts.request_timeout_secs = 2;
        let service = RagService::new(
            &config,
            Backends::new()
                .with_embedder(Arc::new(SlowEmbedder))
                .with_generator(Arc::new(MockChatModel::new()))
                .with_store(Arc::new(MemoryChunkStore::new())),
        );

        let err = service.query(Query::new("question")).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Timeout {
                stage: "embedding",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_within_caller_deadline() {
        let service = RagService::new(
            &DocentConfig::default(),
            Backends::new()
                .with_embedder(Arc::new(SlowEmbedder))
                .with_generator(Arc::new(MockChatModel::new()))
                .with_store(Arc::new(MemoryChunkStore::new())),
        );

        let err = service
            .query_within(Query::new("question"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout { stage: "query", .. }));
    }

    #[tokio::test]
    async fn test_generation_failure_is_provider_error() {
        let config = small_chunks_config();
        let store = Arc::new(MemoryChunkStore::new());
        let service = RagService::new(
            &config,
            Backends::new()
                .with_embedder(Arc::new(MockEmbedding::new()))
                .with_generator(Arc::new(MockChatModel::failing("model overloaded")))
                .with_store(store),
        );
        service.index_document("doc-1", "red green blue").await.unwrap();

        let err = service
            .query(Query::new("red green blue"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Provider(ref m) if m.contains("model overloaded")));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_search_failure_is_store_error() {
        let chat = MockChatModel::new();
        let service = RagService::new(
            &DocentConfig::default(),
            Backends::new()
                .with_embedder(Arc::new(MockEmbedding::new()))
                .with_generator(Arc::new(chat.clone()))
                .with_store(Arc::new(UnavailableStore)),
        );

        let err = service.query(Query::new("red green blue")).await.unwrap_err();
        assert!(matches!(err, RagError::Store(ref m) if m.contains("database is locked")));
        assert!(!err.is_client_error());
        assert!(chat.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_provider_error() {
        let store = Arc::new(MemoryChunkStore::new());
        let chat = MockChatModel::new();
        let service = RagService::new(
            &DocentConfig::default(),
            Backends::new()
                .with_embedder(Arc::new(SelectiveEmbedder {
                    marker: "boiler",
                    inner: MockEmbedding::new(),
                }))
                .with_generator(Arc::new(chat.clone()))
                .with_store(store),
        );
        service.index_document("doc-1", "the pump is serviced").await.unwrap();

        let err = service
            .query(Query::new("when is the boiler checked?"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Provider(ref m) if m.contains("rate limited")));
        assert!(!err.is_client_error());
        assert!(chat.prompts().is_empty());
    }
}
