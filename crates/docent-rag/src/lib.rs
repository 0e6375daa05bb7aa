//! Retrieval-augmented generation over a private document corpus.
//!
//! [`RagService`] ties the chunker, an embedding provider, a chunk store and
//! a generative model together to index documents, drop their chunks, and
//! answer questions from the retrieved context. [`DocumentSync`] applies the
//! same operations as best-effort side effects of document mutations.

pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod prompt;
pub mod service;

pub use error::RagError;
pub use generation::{
    ChatMessage, ChatModel, ChatRole, CompletionOptions, DynChatModel, MockChatModel,
    OpenAiChatModel,
};
pub use lifecycle::DocumentSync;
pub use service::{
    Backends, Capabilities, IndexOutcome, RagService, SkipReason, NOT_CONFIGURED_ANSWER,
    NO_RESULTS_ANSWER,
};
