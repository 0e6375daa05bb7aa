//! Embedding service trait and implementations.
//!
//! - `OpenAiEmbeddingService` calls an OpenAI-compatible `/embeddings`
//!   endpoint. This is the production embedding backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use docent_core::config::EmbeddingConfig;
use docent_core::error::DocentError;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. The same
/// service must be used for indexing and querying so that dimensions match.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, DocentError>> + Send;

    /// Name of the embedding model behind this service.
    fn model_name(&self) -> &str;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynEmbeddingService>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, DocentError>> + Send + 'a>>;

    /// Name of the embedding model behind this service.
    fn model_name(&self) -> &str;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, DocentError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn model_name(&self) -> &str {
        EmbeddingService::model_name(self)
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbeddingService - OpenAI-compatible HTTP API
// ---------------------------------------------------------------------------

/// Embedding client for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiEmbeddingService {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `timeout` bounds every request made by this client.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DocentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocentError::Provider(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from configuration, reading the API key from the named env var.
    pub fn from_config(config: &EmbeddingConfig, timeout: Duration) -> Result<Self, DocentError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DocentError::Config(format!(
                "embedding API key variable {} is not set",
                config.api_key_env
            ))
        })?;

        let service = Self::new(&config.base_url, api_key, config.model.clone(), timeout)?;
        info!(model = %service.model, base_url = %service.base_url, "Embedding provider ready");
        Ok(service)
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "input": text,
        })
    }

    /// Extract the first embedding from an `/embeddings` response body.
    fn parse_response(body: &Value) -> Result<Vec<f32>, DocentError> {
        let values = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|first| first.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                DocentError::Provider("embedding response contained no data".to_string())
            })?;

        values
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    DocentError::Provider("embedding contained a non-numeric value".to_string())
                })
            })
            .collect()
    }
}

impl EmbeddingService for OpenAiEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DocentError> {
        if text.is_empty() {
            return Err(DocentError::Provider("Cannot embed empty text".to_string()));
        }

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| DocentError::Provider(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocentError::Provider(format!(
                "embedding API returned {}: {}",
                status, detail
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DocentError::Provider(format!("invalid embedding response: {}", e)))?;

        let embedding = Self::parse_response(&body)?;
        debug!(model = %self.model, dimensions = embedding.len(), "Embedding created");
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic unit vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs and unrelated inputs are close to
/// orthogonal. This allows testing retrieval without a real model.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        crate::similarity::normalize(&result)
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DocentError> {
        if text.is_empty() {
            return Err(DocentError::Provider("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::with_dimensions(64);
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 64);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_unrelated_inputs_are_dissimilar() {
        let service = MockEmbedding::new();
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
        assert!(cosine_similarity(&v1, &v2) < 0.5);
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::new();
        let v = service.embed("normalised").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_dyn_dispatch_matches_static() {
        let service = MockEmbedding::new();
        let boxed: Box<dyn DynEmbeddingService> = Box::new(service.clone());
        let a = boxed.embed_boxed("dispatch").await.unwrap();
        let b = service.embed("dispatch").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(boxed.model_name(), "mock-embedding");
    }

    #[test]
    fn test_openai_request_body() {
        let service = OpenAiEmbeddingService::new(
            "https://example.test/v1/",
            "key",
            "text-embedding-ada-002",
            Duration::from_secs(5),
        )
        .unwrap();
        let body = service.request_body("hello");
        assert_eq!(body["model"], "text-embedding-ada-002");
        assert_eq!(body["input"], "hello");
        assert_eq!(service.base_url, "https://example.test/v1");
    }

    #[test]
    fn test_openai_parse_response() {
        let body = json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.5, -0.25, 1.0]}],
            "model": "text-embedding-ada-002"
        });
        let v = OpenAiEmbeddingService::parse_response(&body).unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn test_openai_parse_response_without_data() {
        let body = json!({"data": []});
        let err = OpenAiEmbeddingService::parse_response(&body).unwrap_err();
        assert!(matches!(err, DocentError::Provider(_)));
    }

    #[test]
    fn test_openai_parse_response_non_numeric() {
        let body = json!({"data": [{"embedding": [0.1, "x"]}]});
        assert!(OpenAiEmbeddingService::parse_response(&body).is_err());
    }

    #[test]
    fn test_from_config_missing_key() {
        let config = EmbeddingConfig {
            api_key_env: "DOCENT_TEST_UNSET_EMBEDDING_KEY".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = OpenAiEmbeddingService::from_config(&config, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DocentError::Config(_)));
    }
}
