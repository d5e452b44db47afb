//! Story nodes - the beats of a story - and the keys of the paths between them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoryError, StoryResult};

/// One beat of the story: what happens, and how NPCs react to getting here.
///
/// Nodes are never edited after they join a graph, so path references to
/// them stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    id: String,

    /// Narrative content / NPC reaction.
    context: String,

    /// Author-defined payload, passed through untouched.
    #[serde(default)]
    metadata: Value,
}

impl StoryNode {
    /// Create a node with empty metadata.
    pub fn new(id: impl Into<String>, context: impl Into<String>) -> StoryResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoryError::InvalidArgument(
                "story node id cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            context: context.into(),
            metadata: Value::Null,
        })
    }

    /// Attach author metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Human-readable label: the context, or the id when there is none.
    pub fn label(&self) -> &str {
        if self.context.is_empty() {
            &self.id
        } else {
            &self.context
        }
    }
}

/// Directed key of a path: `(start, end)`.
///
/// Serialized as a two-element array so ids may contain any character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathKey(String, String);

impl PathKey {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self(start.into(), end.into())
    }

    pub fn start(&self) -> &str {
        &self.0
    }

    pub fn end(&self) -> &str {
        &self.1
    }

    pub fn is_self_loop(&self) -> bool {
        self.0 == self.1
    }
}

impl<S: Into<String>, E: Into<String>> From<(S, E)> for PathKey {
    fn from((start, end): (S, E)) -> Self {
        Self::new(start, end)
    }
}

impl std::fmt::Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.0, self.1)
    }
}
