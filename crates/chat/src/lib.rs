//! Chat session model, completion pipeline, and model catalog cache.

pub mod catalog;
pub mod completion;
pub mod credential;
pub mod openrouter;
pub mod pipeline;
pub mod session;
pub mod storage;

/// Time-bounded model catalog cache.
pub use catalog::{CatalogSource, ModelCatalog, SlotState};
/// Completion request/provider interface.
pub use completion::{CompletionProvider, CompletionRequest};
/// Current API credential and model selection.
pub use credential::{CredentialContext, Credentials};
/// HTTP client for OpenRouter-compatible endpoints.
pub use openrouter::OpenRouterClient;
/// Send orchestration over the session store.
pub use pipeline::{CompletionPipeline, PendingSend, PipelineOptions, SendOutcome};
/// In-memory session store.
pub use session::{Session, SessionStore, SessionSummary};
/// Persistent key-value storage.
pub use storage::{FileStore, KeyValueStore, MemoryStore};
