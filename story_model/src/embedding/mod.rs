//! Embedding module - the pluggable embedding function and the per-path
//! vector statistic built on top of it.
//!
//! The embedding function itself is an external collaborator: anything that
//! maps a batch of strings to one vector per string. The story crates only
//! ever hold it through an [`EmbeddingFn`], which is proven to produce vectors
//! of the right dimension before it is accepted.

mod path;

pub use path::*;

use std::sync::Arc;
use thiserror::Error;

use crate::error::{StoryError, StoryResult};

/// Text sent to an embedding function to check its output dimension.
pub const DEFAULT_PROBE_TEXT: &str = "test string";

/// Error reported by an [`Embedder`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EmbedError(pub String);

impl EmbedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Maps a batch of texts to one vector per text.
///
/// Implementations must not depend on batch composition: embedding `[a, b]`
/// must give the same vectors as embedding `[a]` and `[b]` separately.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

impl<F> Embedder for F
where
    F: Fn(&[&str]) -> Result<Vec<Vec<f32>>, EmbedError> + Send + Sync,
{
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self(texts)
    }
}

/// An embedding function that has passed its dimension probe.
///
/// Cloning shares the underlying embedder.
#[derive(Clone)]
pub struct EmbeddingFn {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
}

impl EmbeddingFn {
    /// Validate `embedder` with the default probe text.
    pub fn probe(embedder: Arc<dyn Embedder>, dimension: usize) -> StoryResult<Self> {
        Self::probe_with(embedder, dimension, DEFAULT_PROBE_TEXT)
    }

    /// Validate `embedder` by embedding a single-element batch and checking
    /// the returned vector has `dimension` components.
    pub fn probe_with(
        embedder: Arc<dyn Embedder>,
        dimension: usize,
        probe_text: &str,
    ) -> StoryResult<Self> {
        if dimension == 0 {
            return Err(StoryError::InvalidArgument(
                "dimension must be positive".to_string(),
            ));
        }

        let batch = embedder
            .embed(&[probe_text])
            .map_err(|e| StoryError::EmbeddingFailed(e.to_string()))?;

        let actual = batch.first().map(Vec::len).unwrap_or(0);
        if batch.len() != 1 || actual != dimension {
            return Err(StoryError::InvalidEmbeddingFunction {
                expected: dimension,
                actual,
            });
        }

        Ok(Self {
            embedder,
            dimension,
        })
    }

    /// Dimension every vector from this function has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a batch, checking that exactly one vector of the right
    /// dimension comes back per text.
    pub fn embed(&self, texts: &[&str]) -> StoryResult<Vec<Vec<f32>>> {
        let batch = self
            .embedder
            .embed(texts)
            .map_err(|e| StoryError::EmbeddingFailed(e.to_string()))?;

        if batch.len() != texts.len() {
            return Err(StoryError::EmbeddingFailed(format!(
                "returned {} vectors for {} texts",
                batch.len(),
                texts.len()
            )));
        }

        if let Some(bad) = batch.iter().find(|v| v.len() != self.dimension) {
            return Err(StoryError::EmbeddingFailed(format!(
                "returned a {}-dimensional vector, expected {}",
                bad.len(),
                self.dimension
            )));
        }

        if batch.iter().flatten().any(|x| !x.is_finite()) {
            return Err(StoryError::EmbeddingFailed(
                "returned a non-finite component".to_string(),
            ));
        }

        Ok(batch)
    }

    /// Whether both handles wrap the same embedder instance.
    pub fn shares_embedder(&self, other: &EmbeddingFn) -> bool {
        Arc::ptr_eq(&self.embedder, &other.embedder)
    }
}

impl std::fmt::Debug for EmbeddingFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingFn")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

/// Whether an embedding (or a whole graph) may still be tuned.
///
/// `Locked` is permanent: there is no way back to `Open`.
#[derive(Debug, Clone)]
pub enum Tuning {
    Open(EmbeddingFn),
    Locked,
}

impl Tuning {
    pub fn is_locked(&self) -> bool {
        matches!(self, Tuning::Locked)
    }

    /// The embedding function, if still open.
    pub fn embedding_fn(&self) -> Option<&EmbeddingFn> {
        match self {
            Tuning::Open(embedding_fn) => Some(embedding_fn),
            Tuning::Locked => None,
        }
    }
}

impl From<Option<EmbeddingFn>> for Tuning {
    fn from(embedding_fn: Option<EmbeddingFn>) -> Self {
        match embedding_fn {
            Some(embedding_fn) => Tuning::Open(embedding_fn),
            None => Tuning::Locked,
        }
    }
}
