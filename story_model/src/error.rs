//! Error taxonomy shared by every story crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the story crates.
pub type StoryResult<T> = Result<T, StoryError>;

/// What kind of thing a [`StoryError::MissingReference`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Node,
    Template,
    Path,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Node => write!(f, "node"),
            ReferenceKind::Template => write!(f, "template"),
            ReferenceKind::Path => write!(f, "path"),
        }
    }
}

/// Errors raised while building, tuning, persisting or exporting a story.
#[derive(Debug, Error)]
pub enum StoryError {
    /// Malformed constructor input (empty name, wrong vector length, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding function failed its probe call.
    #[error(
        "embedding function is not valid: returns {actual}-dimensional vectors instead of {expected}"
    )]
    InvalidEmbeddingFunction { expected: usize, actual: usize },

    /// The embedding function errored or returned a malformed batch.
    #[error("embedding function failed: {0}")]
    EmbeddingFailed(String),

    /// A template or path was given an empty name.
    #[error("{0} name cannot be empty")]
    EmptyName(ReferenceKind),

    /// A template or path name is already taken.
    #[error("name '{0}' is already used by a template or path; use a new unique name")]
    DuplicateName(String),

    /// A node id is already taken.
    #[error(
        "node '{0}' already exists; if there is a second way to reach it, add a copy under a new id"
    )]
    DuplicateNode(String),

    /// A path for this ordered pair already exists.
    #[error("path {start} -> {end} already exists")]
    DuplicateEdge { start: String, end: String },

    /// A path would start and end on the same node.
    #[error("path cannot start and end on node '{0}'")]
    SelfLoop(String),

    /// Mutation attempted on a finalized graph.
    #[error("story graph '{0}' is locked; no change can be made to it")]
    GraphLocked(String),

    /// Tuning attempted on an embedding without an embedding function.
    #[error("embedding '{0}' is locked and cannot be tuned")]
    EmbeddingLocked(String),

    /// The example count of an embedding would no longer fit in its weight.
    #[error("embedding '{0}' cannot take more examples; its weight is at the limit")]
    WeightOverflow(String),

    /// A node, template or path that does not exist.
    #[error("unknown {kind} '{id}'; must be one of [{}]", .options.join(", "))]
    MissingReference {
        kind: ReferenceKind,
        id: String,
        options: Vec<String>,
    },

    /// A registered path rule refused the path.
    #[error("path rejected by rule '{rule}': {reason}")]
    RuleRejected { rule: String, reason: String },

    /// A persisted document cannot be turned back into a graph.
    #[error("corrupt story document: {0}")]
    CorruptDocument(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external index client refused the exported records.
    #[error("index client failed for collection '{collection}': {message}")]
    Index { collection: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoryError {
    /// Whether an authoring tool can simply retry with corrected input.
    ///
    /// Recoverable errors never leave the graph in a modified state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoryError::EmptyName(_)
                | StoryError::DuplicateName(_)
                | StoryError::DuplicateNode(_)
                | StoryError::DuplicateEdge { .. }
                | StoryError::SelfLoop(_)
                | StoryError::GraphLocked(_)
                | StoryError::EmbeddingLocked(_)
                | StoryError::WeightOverflow(_)
                | StoryError::MissingReference { .. }
                | StoryError::RuleRejected { .. }
                | StoryError::EmbeddingFailed(_)
        )
    }
}
