//! Path embeddings - the utterance-space target attached to each path.

use serde::{Deserialize, Serialize};

use super::{EmbeddingFn, Tuning};
use crate::error::{StoryError, StoryResult};

/// Persisted form of a [`PathEmbedding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSnapshot {
    pub name: String,
    pub vector: Vec<f32>,
    pub weight: u64,
}

/// A named vector statistic: the running mean of every example folded in.
///
/// `weight` counts the examples behind `vector`. An embedding that has never
/// been tuned has weight 0 and is exactly the zero vector.
///
/// There is deliberately no `Clone`; copies are made with
/// [`PathEmbedding::duplicate`] and always carry a new name.
#[derive(Debug)]
pub struct PathEmbedding {
    name: String,
    dimension: usize,
    vector: Vec<f32>,
    weight: u64,
    tuning: Tuning,
}

impl PathEmbedding {
    /// Create an untuned (all-zero) embedding.
    ///
    /// Without an embedding function the embedding is locked for good.
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        embedding_fn: Option<EmbeddingFn>,
    ) -> StoryResult<Self> {
        Self::with_state(name, dimension, embedding_fn, vec![0.0; dimension], 0)
    }

    /// Create an embedding with a known vector and weight, e.g. one loaded
    /// from storage.
    ///
    /// A weight of 0 discards `vector` and starts from zero.
    pub fn with_state(
        name: impl Into<String>,
        dimension: usize,
        embedding_fn: Option<EmbeddingFn>,
        vector: Vec<f32>,
        weight: u64,
    ) -> StoryResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoryError::InvalidArgument(
                "path embedding name cannot be empty".to_string(),
            ));
        }
        if dimension == 0 {
            return Err(StoryError::InvalidArgument(
                "dimension must be positive".to_string(),
            ));
        }
        if let Some(embedding_fn) = &embedding_fn {
            if embedding_fn.dimension() != dimension {
                return Err(StoryError::InvalidEmbeddingFunction {
                    expected: dimension,
                    actual: embedding_fn.dimension(),
                });
            }
        }
        if vector.len() != dimension {
            return Err(StoryError::InvalidArgument(format!(
                "embedding '{}' has {} dims instead of the defined {}",
                name,
                vector.len(),
                dimension
            )));
        }

        let vector = if weight == 0 {
            vec![0.0; dimension]
        } else {
            vector
        };

        Ok(Self {
            name,
            dimension,
            vector,
            weight,
            tuning: embedding_fn.into(),
        })
    }

    /// Rebuild from a snapshot.
    ///
    /// `dimension` comes from the owning graph rather than the vector length,
    /// so an empty vector with weight 0 reloads as the zero vector.
    pub fn from_snapshot(
        snapshot: EmbeddingSnapshot,
        dimension: usize,
        embedding_fn: Option<EmbeddingFn>,
    ) -> StoryResult<Self> {
        let vector = if snapshot.vector.is_empty() && snapshot.weight == 0 {
            vec![0.0; dimension]
        } else {
            snapshot.vector
        };
        Self::with_state(
            snapshot.name,
            dimension,
            embedding_fn,
            vector,
            snapshot.weight,
        )
    }

    pub fn snapshot(&self) -> EmbeddingSnapshot {
        EmbeddingSnapshot {
            name: self.name.clone(),
            vector: self.vector.clone(),
            weight: self.weight,
        }
    }

    /// Deep copy under a new name, sharing the embedding function.
    ///
    /// Name uniqueness is the owning graph's concern.
    pub fn duplicate(&self, new_name: impl Into<String>) -> StoryResult<Self> {
        let name = new_name.into();
        if name.is_empty() {
            return Err(StoryError::InvalidArgument(
                "path embedding name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            dimension: self.dimension,
            vector: self.vector.clone(),
            weight: self.weight,
            tuning: self.tuning.clone(),
        })
    }

    /// Fold `examples` into the running mean and return the new vector.
    ///
    /// The current vector counts as one observation of mass `weight`, each
    /// new example as mass 1, so every example ever added ends up with equal
    /// weight. If the embedding function fails nothing is changed.
    pub fn tune<S: AsRef<str>>(&mut self, examples: &[S]) -> StoryResult<&[f32]> {
        let embedding_fn = match &self.tuning {
            Tuning::Open(embedding_fn) => embedding_fn,
            Tuning::Locked => return Err(StoryError::EmbeddingLocked(self.name.clone())),
        };

        if examples.is_empty() {
            return Ok(self.vector.as_slice());
        }

        let weight = u64::try_from(examples.len())
            .ok()
            .and_then(|added| self.weight.checked_add(added))
            .ok_or_else(|| StoryError::WeightOverflow(self.name.clone()))?;

        let texts: Vec<&str> = examples.iter().map(AsRef::as_ref).collect();
        let batch = embedding_fn.embed(&texts)?;

        let prior = self.weight as f64;
        let total = prior + batch.len() as f64;
        let mut sums: Vec<f64> = self.vector.iter().map(|x| *x as f64 * prior).collect();
        for vector in &batch {
            for (sum, x) in sums.iter_mut().zip(vector) {
                *sum += *x as f64;
            }
        }

        self.vector = sums.into_iter().map(|sum| (sum / total) as f32).collect();
        self.weight = weight;

        tracing::debug!(
            embedding = %self.name,
            added = batch.len(),
            weight = self.weight,
            "tuned path embedding"
        );

        Ok(self.vector.as_slice())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current vector, all zeros if never tuned.
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// Number of examples folded into the vector.
    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn is_locked(&self) -> bool {
        self.tuning.is_locked()
    }

    pub fn embedding_fn(&self) -> Option<&EmbeddingFn> {
        self.tuning.embedding_fn()
    }
}
