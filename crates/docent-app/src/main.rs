//! Docent application binary - composition root.
//!
//! 1. Parse arguments and load configuration from TOML
//! 2. Initialize logging
//! 3. Build the embedding provider, chat model and chunk store
//! 4. Hand them to the RAG service and run the requested command

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use docent_core::config::{DocentConfig, ProviderKind, StorageBackend};
use docent_core::error::DocentError;
use docent_core::types::QueryRequest;
use docent_rag::{Backends, DynChatModel, IndexOutcome, MockChatModel, OpenAiChatModel, RagService};
use docent_storage::{ChunkStore, Database, MemoryChunkStore, SqliteChunkStore};
use docent_vector::{DynEmbeddingService, MockEmbedding, OpenAiEmbeddingService};

use cli::{CliArgs, Command};

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Embedding provider named by the config, or `None` when it is disabled or
/// cannot be built (e.g. the API key variable is unset).
fn build_embedder(config: &DocentConfig, timeout: Duration) -> Option<Arc<dyn DynEmbeddingService>> {
    match config.embedding.provider {
        ProviderKind::Openai => match OpenAiEmbeddingService::from_config(&config.embedding, timeout) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                tracing::warn!(error = %e, "Embedding provider unavailable");
                None
            }
        },
        ProviderKind::Mock => Some(Arc::new(MockEmbedding::with_dimensions(
            config.embedding.dimensions,
        ))),
        ProviderKind::None => None,
    }
}

fn build_generator(config: &DocentConfig, timeout: Duration) -> Option<Arc<dyn DynChatModel>> {
    match config.generation.provider {
        ProviderKind::Openai => match OpenAiChatModel::from_config(&config.generation, timeout) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                tracing::warn!(error = %e, "Chat provider unavailable");
                None
            }
        },
        ProviderKind::Mock => Some(Arc::new(MockChatModel::new())),
        ProviderKind::None => None,
    }
}

fn build_store(config: &DocentConfig) -> Result<Arc<dyn ChunkStore>, DocentError> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let db_path = config.db_path();
            let db = Database::new(&db_path)?;
            tracing::info!(path = %db_path.display(), "SQLite chunk store opened");
            Ok(Arc::new(
                SqliteChunkStore::new(Arc::new(db)).with_lock_timeout(config.request_timeout()),
            ))
        }
        StorageBackend::Memory => {
            tracing::info!("In-memory chunk store; chunks are lost on exit");
            Ok(Arc::new(MemoryChunkStore::new()))
        }
    }
}

fn describe_outcome(document_id: &str, outcome: IndexOutcome) -> String {
    match outcome {
        IndexOutcome::Indexed { stored, skipped: 0 } => {
            format!("{}: stored {} chunk(s)", document_id, stored)
        }
        IndexOutcome::Indexed { stored, skipped } => format!(
            "{}: stored {} chunk(s), skipped {} whose embedding failed",
            document_id, stored, skipped
        ),
        IndexOutcome::Skipped { reason } => format!("{}: nothing indexed ({})", document_id, reason),
    }
}

fn read_document(path: &Path) -> Result<String, DocentError> {
    Ok(std::fs::read_to_string(path)?)
}

async fn run(
    command: Command,
    config: &DocentConfig,
    config_file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = config.request_timeout();
    let store = build_store(config)?;
    let backends = Backends {
        embedder: build_embedder(config, timeout),
        generator: build_generator(config, timeout),
        store: Some(Arc::clone(&store)),
    };
    let rag = RagService::new(config, backends);

    match command {
        Command::Index { document_id, file } => {
            let content = read_document(&file)?;
            let outcome = rag.index_document(&document_id, &content).await?;
            println!("{}", describe_outcome(&document_id, outcome));
        }
        Command::Reindex { document_id, file } => {
            let content = read_document(&file)?;
            let outcome = rag.reindex_document(&document_id, &content).await?;
            println!("{}", describe_outcome(&document_id, outcome));
        }
        Command::Delete { document_id } => {
            rag.delete_document_chunks(&document_id).await?;
            println!("{}: chunks deleted", document_id);
        }
        Command::Chunks { document_id } => {
            let chunks = store.get_by_document_id(&document_id).await?;
            let listing: Vec<_> = chunks
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "chunk_index": c.chunk_index,
                        "created_at": c.created_at,
                        "dimensions": c.embedding.len(),
                        "content": c.content,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Query {
            text,
            top_k,
            threshold,
        } => {
            let request = QueryRequest {
                query: text,
                top_k,
                threshold,
            };
            let response = rag.query(request.into()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Status => {
            let chunk_count = store.count().await?;
            let status = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_path": config_file.display().to_string(),
                "storage": config.storage.backend,
                "db_path": config.db_path().display().to_string(),
                "chunks": chunk_count,
                "embedding_model": config.embedding.model,
                "chat_model": config.generation.model,
                "capabilities": rag.capabilities(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();

    // Tracing is initialised before load_or_default so its warnings reach the log.
    let log_level = args.resolve_log_level(&config_file);
    init_tracing(&log_level);
    tracing::debug!("Starting Docent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DocentConfig::load_or_default(&config_file);
    args.apply_overrides(&mut config);

    run(args.command, &config, &config_file).await
}
