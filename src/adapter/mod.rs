//! Model adapter: the bridge between tasks and a completion backend.
//!
//! The adapter owns everything model-specific that agents should not have to
//! know: which model is active, what family it belongs to, which sampling
//! temperature to use, how to shape the prompt, and when a cached response
//! can stand in for a backend call.
//!
//! One `run` call goes through a fixed pipeline:
//!
//! ```text
//! task -> optimize prompt -> resolve temperature -> fingerprint
//!      -> cache lookup -> (hit: return) | (miss: backend call -> cache fill)
//! ```
//!
//! Streamed calls aggregate chunks in arrival order into one output string;
//! a failure mid-stream discards everything accumulated so far and nothing
//! is cached.

pub mod cache;
pub mod prompt;

pub use cache::{CacheStats, Fingerprint, ResponseCache};

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::capability::CapabilitySet;
use crate::config::EngineConfig;
use crate::llm::{
    BackendError, CompletionBackend, CompletionRequest, ModelCatalog, ModelFamily,
};
use crate::task::Task;

/// Errors surfaced by the adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The requested model is not present in the backend catalog.
    #[error("model '{name}' not found in backend catalog")]
    ModelNotFound { name: String },

    /// `run` was called before any model was selected.
    #[error("no model selected")]
    NoModelSelected,

    /// The backend call itself failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

struct ActiveModel {
    name: String,
    family: ModelFamily,
    pinned_temperature: Option<f32>,
}

impl ActiveModel {
    /// Effective temperature ignoring per-task overrides.
    fn temperature(&self) -> f32 {
        self.pinned_temperature
            .unwrap_or_else(|| self.family.recommended_temperature())
    }
}

/// Stateful adapter around one selected model.
///
/// # Invariants
/// - No capabilities are advertised before a model is selected.
/// - The fingerprint covers the final optimized prompt, so two tasks that
///   shape to the same prompt share a cache entry.
/// - No lock is held across a backend call.
pub struct ModelAdapter {
    backend: Arc<dyn CompletionBackend>,
    catalog: Arc<dyn ModelCatalog>,
    active: RwLock<Option<ActiveModel>>,
    cache: Mutex<ResponseCache>,
    max_tokens: Option<u32>,
}

impl ModelAdapter {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        catalog: Arc<dyn ModelCatalog>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            backend,
            catalog,
            active: RwLock::new(None),
            cache: Mutex::new(ResponseCache::new(config.cache_ttl)),
            max_tokens: config.max_tokens,
        }
    }

    /// Adapter over a client that serves both completion and catalog duty,
    /// like [`crate::llm::OllamaClient`].
    pub fn from_client<C>(client: Arc<C>, config: &EngineConfig) -> Self
    where
        C: CompletionBackend + ModelCatalog + 'static,
    {
        Self::new(client.clone(), client, config)
    }

    /// Select `name` as the active model.
    ///
    /// Verifies the model against the backend catalog and derives its
    /// family. A pinned temperature survives re-selection; the family
    /// default applies only while nothing is pinned.
    ///
    /// # Errors
    /// - [`AdapterError::ModelNotFound`] when the catalog has no exact match
    /// - [`AdapterError::Backend`] when the catalog cannot be listed
    ///
    /// On error the previously active model stays selected.
    pub async fn select_model(&self, name: &str) -> Result<(), AdapterError> {
        let models = self.catalog.list_models().await?;
        if !models.iter().any(|m| m.name == name) {
            tracing::warn!(model = %name, available = models.len(), "model not in catalog");
            return Err(AdapterError::ModelNotFound {
                name: name.to_string(),
            });
        }

        let family = ModelFamily::from_model_name(name);
        let mut active = self.active.write().await;
        let pinned_temperature = active.as_ref().and_then(|m| m.pinned_temperature);
        tracing::info!(
            model = %name,
            family = %family,
            temperature = pinned_temperature.unwrap_or_else(|| family.recommended_temperature()),
            "model selected"
        );
        *active = Some(ActiveModel {
            name: name.to_string(),
            family,
            pinned_temperature,
        });
        Ok(())
    }

    /// Pin the sampling temperature, overriding the family default until
    /// [`release_temperature`](Self::release_temperature) is called.
    ///
    /// # Errors
    /// [`AdapterError::NoModelSelected`] before a model is selected.
    pub async fn pin_temperature(&self, temperature: f32) -> Result<(), AdapterError> {
        let mut active = self.active.write().await;
        match active.as_mut() {
            Some(model) => {
                model.pinned_temperature = Some(temperature);
                Ok(())
            }
            None => Err(AdapterError::NoModelSelected),
        }
    }

    /// Drop any pinned temperature, returning to the family default.
    pub async fn release_temperature(&self) {
        if let Some(model) = self.active.write().await.as_mut() {
            model.pinned_temperature = None;
        }
    }

    /// Capabilities implied by the active model's family; empty before
    /// selection.
    pub async fn capabilities(&self) -> CapabilitySet {
        match self.active.read().await.as_ref() {
            Some(model) => model.family.default_capabilities(),
            None => CapabilitySet::new(),
        }
    }

    pub async fn active_model(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|m| m.name.clone())
    }

    pub async fn family(&self) -> Option<ModelFamily> {
        self.active.read().await.as_ref().map(|m| m.family.clone())
    }

    /// Effective temperature for the next call, before per-task overrides.
    pub async fn temperature(&self) -> Option<f32> {
        self.active.read().await.as_ref().map(ActiveModel::temperature)
    }

    /// Execute `task` against the active model.
    ///
    /// # Postconditions
    /// - On a cache hit the backend is not invoked.
    /// - On success the response is cached under the request fingerprint.
    /// - On failure nothing is cached.
    pub async fn run(&self, task: &Task) -> Result<String, AdapterError> {
        let (model, temperature) = {
            let active = self.active.read().await;
            let active = active.as_ref().ok_or(AdapterError::NoModelSelected)?;
            let temperature = task
                .temperature_override()
                .or(active.pinned_temperature)
                .unwrap_or_else(|| active.family.recommended_temperature());
            (active.name.clone(), temperature)
        };

        let request = CompletionRequest {
            model,
            prompt: prompt::optimize(task),
            temperature,
            max_tokens: self.max_tokens,
        };
        let key = Fingerprint::of(&request);

        {
            let mut cache = self.cache.lock().await;
            if let Some(output) = cache.get(&key) {
                tracing::debug!(task_id = %task.id(), "serving cached response");
                return Ok(output);
            }
        }

        tracing::debug!(
            task_id = %task.id(),
            model = %request.model,
            stream = task.wants_stream(),
            "invoking backend"
        );

        let output = if task.wants_stream() {
            self.collect_stream(&request).await?
        } else {
            self.backend.complete(&request).await?
        };

        let mut cache = self.cache.lock().await;
        cache.insert(key, output.clone());
        Ok(output)
    }

    /// Drive a streamed call to completion, concatenating chunks in order.
    /// Any chunk error aborts the whole call; partial output is dropped.
    async fn collect_stream(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let mut stream = self.backend.stream(request).await?;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?);
        }
        Ok(output)
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Drop expired cache entries, returning how many were removed.
    pub async fn sweep_cache(&self) -> usize {
        self.cache.lock().await.sweep()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}
