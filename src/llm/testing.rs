//! Scripted backend doubles for the engine's test suites.
//!
//! Mocking happens by composition at the trait seam: `MockBackend`
//! implements both [`CompletionBackend`] and [`ModelCatalog`] with scripted
//! behavior and invocation accounting, so adapter/agent/dispatch tests can
//! observe exactly when the backend was hit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    BackendError, CompletionBackend, CompletionRequest, CompletionStream, ModelCatalog, ModelInfo,
};

/// Backend double with canned output, optional chunk script, optional
/// failure injection, and an invocation counter.
pub(crate) struct MockBackend {
    chunks: Vec<String>,
    delay: Option<Duration>,
    fail_with: Option<BackendError>,
    fail_generation: Option<BackendError>,
    fail_mid_stream: Option<BackendError>,
    models: Vec<ModelInfo>,
    invocations: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Double that answers every request with `output`.
    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            chunks: vec![output.into()],
            delay: None,
            fail_with: None,
            fail_generation: None,
            fail_mid_stream: None,
            models: Self::default_models(),
            invocations: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Double that streams the given chunks; `complete` returns their
    /// concatenation.
    pub fn with_chunks(chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut mock = Self::with_output("");
        mock.chunks = chunks.into_iter().map(Into::into).collect();
        mock
    }

    /// Double whose every call fails with `error`.
    pub fn failing(error: BackendError) -> Self {
        let mut mock = Self::with_output("");
        mock.fail_with = Some(error);
        mock
    }

    /// Emit all chunks, then end the stream with `error`.
    pub fn fail_mid_stream(mut self, error: BackendError) -> Self {
        self.fail_mid_stream = Some(error);
        self
    }

    /// Keep the catalog healthy but fail every generation call with `error`.
    pub fn fail_generation(mut self, error: BackendError) -> Self {
        self.fail_generation = Some(error);
        self
    }

    /// Sleep this long inside every backend call (exercises timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the catalog contents.
    pub fn with_models(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.models = names.into_iter().map(|n| ModelInfo::named(n)).collect();
        self
    }

    fn default_models() -> Vec<ModelInfo> {
        ["llama3:8b", "codellama:7b", "mistral:latest"]
            .into_iter()
            .map(ModelInfo::named)
            .collect()
    }

    /// Number of generation calls made (complete + stream).
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The most recent request, if any call was made.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn full_output(&self) -> String {
        self.chunks.concat()
    }

    async fn enter(&self, request: &CompletionRequest) -> Result<(), BackendError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_with.as_ref().or(self.fail_generation.as_ref()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.enter(request).await?;
        Ok(self.full_output())
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, BackendError> {
        self.enter(request).await?;
        let chunks = self.chunks.clone();
        let tail_error = self.fail_mid_stream.clone();
        let stream = async_stream::stream! {
            for chunk in chunks {
                yield Ok(chunk);
            }
            if let Some(error) = tail_error {
                yield Err(error);
            }
        };
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ModelCatalog for MockBackend {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(self.models.clone()),
        }
    }
}
