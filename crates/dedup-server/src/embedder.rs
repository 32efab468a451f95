//! The embedding provider contract (spec §6): a fixed-dimension vector for
//! a non-PII text string. The concrete provider is a named external
//! collaborator; this crate only defines the trait and a deterministic
//! stand-in used by tests and local development.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Failures calling the embedding provider. `NotConfigured` is
/// non-retryable and maps to [`crate::error::DedupError::Unavailable`];
/// `ProviderFailure` is retryable at the caller's discretion -- this crate
/// never retries internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("embedding provider not configured")]
    NotConfigured,

    #[error("embedding provider failure: {0}")]
    ProviderFailure(String),
}

/// Produces a fixed-dimension embedding for a string of non-PII ticket
/// content. Implementations must be `Send + Sync` and safe to invoke
/// concurrently once constructed -- the coordinator builds one instance
/// lazily under a lock and shares it process-wide thereafter.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// The fixed dimensionality every vector this embedder returns has.
    fn dimensions(&self) -> usize;
}

/// A deterministic, hash-based embedder with no external dependency.
/// Produces the same vector for the same text every time, which is all
/// the test suite needs: stable similarity scores across runs without a
/// live provider.
pub struct DeterministicEmbedder {
    dimensions: usize,
}

impl DeterministicEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.is_empty() {
            return Err(EmbedderError::ProviderFailure("empty input".into()));
        }

        // Seed each dimension from a rolling FNV-1a-style hash of the text
        // combined with the dimension index, then squash into [-1, 1].
        let mut vector = Vec::with_capacity(self.dimensions);
        let bytes = text.as_bytes();
        for dim in 0..self.dimensions {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ (dim as u64);
            for &b in bytes {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
            }
            let normalized = (hash % 2_000_001) as f32 / 1_000_000.0 - 1.0;
            vector.push(normalized);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Process-wide embedder handle that defers building the real client until
/// its first call, guarded by a lock so concurrent first-callers block on
/// one construction instead of racing: the shared-resource shape a live
/// provider's connection setup needs, where [`DeterministicEmbedder`]'s
/// trivial construction doesn't. Every call after the first reuses the
/// already-built client.
pub struct LazyEmbedder<F> {
    dimensions: usize,
    inner: Mutex<Option<Arc<dyn Embedder>>>,
    factory: F,
}

impl<F> LazyEmbedder<F>
where
    F: Fn() -> Arc<dyn Embedder> + Send + Sync,
{
    #[must_use]
    pub fn new(dimensions: usize, factory: F) -> Self {
        Self { dimensions, inner: Mutex::new(None), factory }
    }

    async fn get_or_init(&self) -> Arc<dyn Embedder> {
        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.as_ref() {
            return existing.clone();
        }
        let built = (self.factory)();
        *guard = Some(built.clone());
        built
    }
}

#[async_trait]
impl<F> Embedder for LazyEmbedder<F>
where
    F: Fn() -> Arc<dyn Embedder> + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.get_or_init().await.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
