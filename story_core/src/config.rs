//! Graph configuration loaded from TOML.
//!
//! ```toml
//! name = "cool_overprotective_dad"
//! dimension = 28
//! document_path = "stories/dad.json"
//! pretty = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use story_model::{StoryError, StoryResult, DEFAULT_PROBE_TEXT};

/// Settings for creating, saving and resuming one story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Graph name, also the external index collection name.
    pub name: String,

    /// Dimension shared by every embedding in the graph.
    pub dimension: usize,

    /// Where the graph document is saved and resumed from.
    #[serde(default)]
    pub document_path: Option<PathBuf>,

    /// Pretty-print saved documents.
    #[serde(default = "default_pretty")]
    pub pretty: bool,

    /// Text used to probe the embedding function.
    #[serde(default = "default_probe_text")]
    pub probe_text: String,
}

fn default_pretty() -> bool {
    true
}

fn default_probe_text() -> String {
    DEFAULT_PROBE_TEXT.to_string()
}

impl GraphConfig {
    /// Config with defaults for everything but name and dimension.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            document_path: None,
            pretty: default_pretty(),
            probe_text: default_probe_text(),
        }
    }

    /// Set where the graph document lives.
    pub fn with_document_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_path = Some(path.into());
        self
    }

    /// Parse and validate a TOML config.
    pub fn from_toml_str(source: &str) -> StoryResult<Self> {
        let config: GraphConfig =
            toml::from_str(source).map_err(|e| StoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> StoryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| StoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> StoryResult<()> {
        if self.name.is_empty() {
            return Err(StoryError::Config("name cannot be empty".to_string()));
        }
        if self.dimension == 0 {
            return Err(StoryError::Config("dimension must be positive".to_string()));
        }
        if self.probe_text.is_empty() {
            return Err(StoryError::Config("probe_text cannot be empty".to_string()));
        }
        Ok(())
    }
}
