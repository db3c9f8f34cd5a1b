//! Completion backend seam.
//!
//! Trait-based abstraction over model-serving backends, with Ollama as the
//! shipped implementation. The engine only ever talks to a backend through
//! [`CompletionBackend`] (generate text, streamed or not) and
//! [`ModelCatalog`] (enumerate served models); everything HTTP-shaped lives
//! behind these traits.

pub mod error;
pub mod family;
mod ollama;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{BackendError, RetryConfig};
pub use family::ModelFamily;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Parameters for one completion call, fully resolved by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier as known to the backend (e.g. `llama3:8b`).
    pub model: String,
    /// Final, already-optimized prompt text.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate, when limited.
    pub max_tokens: Option<u32>,
}

/// A model descriptor returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl ModelInfo {
    /// Descriptor with just a name; catalog metadata optional.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
        }
    }
}

/// A finite, in-order, non-restartable sequence of output text fragments.
///
/// Fragments concatenate verbatim to the full response; an `Err` item ends
/// the stream and invalidates everything accumulated so far.
pub type CompletionStream = BoxStream<'static, Result<String, BackendError>>;

/// Text-generation capability of a model-serving backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate the full response in one call.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;

    /// Generate the response as a chunk stream.
    ///
    /// # Postconditions
    /// - Chunks arrive in generation order and are never re-emitted
    /// - The stream is finite for a well-behaved backend
    async fn stream(&self, request: &CompletionRequest)
        -> Result<CompletionStream, BackendError>;
}

/// Model enumeration capability, used to validate model selection.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// List the models the backend is currently able to serve.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;
}
