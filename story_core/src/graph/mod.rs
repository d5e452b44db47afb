//! Story Graph - story nodes joined by directed paths, each path carrying the
//! embedding a player's reply must land near to move along it.
//!
//! The graph is append-only: nodes, templates and paths are added but never
//! removed, so anything exported from it stays valid while the graph lives.
//!
//! Every authoring operation comes in two flavours. The `try_*` methods
//! return the typed [`StoryError`]; the plain ones log the error and return
//! `false`, for interactive tools that just re-prompt the author.

mod rules;

pub use rules::*;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::GraphConfig;
use story_model::{
    Embedder, EmbeddingFn, PathEmbedding, PathKey, ReferenceKind, StoryError, StoryNode,
    StoryResult, Tuning, DEFAULT_PROBE_TEXT,
};

/// Name of the all-zero template every graph starts with.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Check that `name` can double as an external index collection name.
///
/// 3-63 characters of `[A-Za-z0-9._-]`, starting and ending with an
/// alphanumeric character, without two periods in a row.
pub fn validate_collection_name(name: &str) -> StoryResult<()> {
    let invalid = |reason: &str| {
        Err(StoryError::InvalidArgument(format!(
            "story graph name '{}' {}",
            name, reason
        )))
    };

    if !(3..=63).contains(&name.len()) {
        return invalid("must be 3 to 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return invalid("may only contain letters, digits, '.', '_' and '-'");
    }
    let alphanumeric_edge = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alphanumeric_edge(name.chars().next()) || !alphanumeric_edge(name.chars().last()) {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("cannot contain two consecutive periods");
    }
    Ok(())
}

/// The story graph.
///
/// An `Open` graph holds a validated embedding function and accepts changes.
/// A graph built without one is `Locked` from birth and read-only forever.
pub struct StoryGraph {
    name: String,
    dimension: usize,
    tuning: Tuning,

    nodes: BTreeMap<String, StoryNode>,

    /// Always contains [`DEFAULT_TEMPLATE`].
    templates: BTreeMap<String, PathEmbedding>,

    /// Paths in insertion order.
    paths: Vec<(PathKey, PathEmbedding)>,

    /// Index: path key -> position in `paths`.
    path_index: HashMap<PathKey, usize>,

    rules: Vec<Box<dyn PathRule>>,
}

impl StoryGraph {
    /// Create a graph. Without an embedder the graph is locked.
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<Self> {
        Self::with_probe(name.into(), dimension, embedder, DEFAULT_PROBE_TEXT)
    }

    /// Create a graph from its configuration.
    pub fn from_config(
        config: &GraphConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<Self> {
        config.validate()?;
        Self::with_probe(
            config.name.clone(),
            config.dimension,
            embedder,
            &config.probe_text,
        )
    }

    fn with_probe(
        name: String,
        dimension: usize,
        embedder: Option<Arc<dyn Embedder>>,
        probe_text: &str,
    ) -> StoryResult<Self> {
        validate_collection_name(&name)?;
        if dimension == 0 {
            return Err(StoryError::InvalidArgument(
                "dimension must be positive".to_string(),
            ));
        }

        let embedding_fn = embedder
            .map(|embedder| EmbeddingFn::probe_with(embedder, dimension, probe_text))
            .transpose()?;

        let default = PathEmbedding::new(DEFAULT_TEMPLATE, dimension, embedding_fn.clone())?;
        let mut templates = BTreeMap::new();
        templates.insert(DEFAULT_TEMPLATE.to_string(), default);

        let tuning = Tuning::from(embedding_fn);
        if tuning.is_locked() {
            tracing::info!(
                graph = %name,
                "story graph created without an embedding function; locked"
            );
        }

        Ok(Self {
            name,
            dimension,
            tuning,
            nodes: BTreeMap::new(),
            templates,
            paths: Vec::new(),
            path_index: HashMap::new(),
            rules: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Authoring
    // -----------------------------------------------------------------------

    /// Add a node. Fails if the graph is locked or the id is taken.
    pub fn try_add_node(&mut self, node: StoryNode) -> StoryResult<()> {
        self.ensure_open()?;
        if self.nodes.contains_key(node.id()) {
            return Err(StoryError::DuplicateNode(node.id().to_string()));
        }

        tracing::debug!(graph = %self.name, node = %node.id(), "added story node");
        self.nodes.insert(node.id().to_string(), node);
        Ok(())
    }

    pub fn add_node(&mut self, node: StoryNode) -> bool {
        let result = self.try_add_node(node);
        self.report("add_node", result)
    }

    /// Create one node per text, returning the new ids.
    ///
    /// Ids are random UUIDs unless given. Either every node is added or none.
    pub fn add_nodes_from_texts<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        ids: Option<Vec<String>>,
    ) -> StoryResult<Vec<String>> {
        self.ensure_open()?;

        let ids = match ids {
            Some(ids) if ids.len() != texts.len() => {
                return Err(StoryError::InvalidArgument(format!(
                    "got {} ids for {} texts",
                    ids.len(),
                    texts.len()
                )));
            }
            Some(ids) => ids,
            None => texts.iter().map(|_| Uuid::new_v4().to_string()).collect(),
        };

        let mut nodes = Vec::with_capacity(texts.len());
        for (id, text) in ids.iter().zip(texts) {
            if self.nodes.contains_key(id)
                || nodes.iter().any(|n: &StoryNode| n.id() == id.as_str())
            {
                return Err(StoryError::DuplicateNode(id.clone()));
            }
            nodes.push(StoryNode::new(id.clone(), text.as_ref())?);
        }

        for node in nodes {
            self.nodes.insert(node.id().to_string(), node);
        }
        tracing::debug!(graph = %self.name, count = ids.len(), "added story nodes from texts");
        Ok(ids)
    }

    /// Create a template under `name` and tune it with `example_prompts`.
    pub fn try_add_embedding_template<S: AsRef<str>>(
        &mut self,
        name: &str,
        example_prompts: &[S],
    ) -> StoryResult<()> {
        let embedding_fn = self.ensure_open()?.clone();
        if name.is_empty() {
            return Err(StoryError::EmptyName(ReferenceKind::Template));
        }
        if self.name_in_use(name) {
            return Err(StoryError::DuplicateName(name.to_string()));
        }

        let mut template = PathEmbedding::new(name, self.dimension, Some(embedding_fn))?;
        template.tune(example_prompts)?;

        tracing::debug!(
            graph = %self.name,
            template = %name,
            weight = template.weight(),
            "added embedding template"
        );
        self.templates.insert(name.to_string(), template);
        Ok(())
    }

    pub fn add_embedding_template<S: AsRef<str>>(
        &mut self,
        name: &str,
        example_prompts: &[S],
    ) -> bool {
        let result = self.try_add_embedding_template(name, example_prompts);
        self.report("add_embedding_template", result)
    }

    /// Check whether a path could be added, without adding it.
    pub fn try_validate_path(
        &self,
        start_id: &str,
        end_id: &str,
        path_name: &str,
        template_name: &str,
    ) -> StoryResult<()> {
        self.ensure_open()?;

        if !self.templates.contains_key(template_name) {
            return Err(StoryError::MissingReference {
                kind: ReferenceKind::Template,
                id: template_name.to_string(),
                options: self.templates.keys().cloned().collect(),
            });
        }

        let key = PathKey::new(start_id, end_id);
        if self.path_index.contains_key(&key) {
            return Err(StoryError::DuplicateEdge {
                start: start_id.to_string(),
                end: end_id.to_string(),
            });
        }

        let (start, end) = match (self.nodes.get(start_id), self.nodes.get(end_id)) {
            (Some(start), Some(end)) => (start, end),
            (start, _) => {
                let missing = if start.is_none() { start_id } else { end_id };
                return Err(StoryError::MissingReference {
                    kind: ReferenceKind::Node,
                    id: missing.to_string(),
                    options: self.nodes.keys().cloned().collect(),
                });
            }
        };

        if key.is_self_loop() {
            return Err(StoryError::SelfLoop(start_id.to_string()));
        }

        if path_name.is_empty() {
            return Err(StoryError::EmptyName(ReferenceKind::Path));
        }
        if self.name_in_use(path_name) {
            return Err(StoryError::DuplicateName(path_name.to_string()));
        }

        for rule in &self.rules {
            rule.check(self, start, end)
                .map_err(|reason| StoryError::RuleRejected {
                    rule: rule.name().to_string(),
                    reason,
                })?;
        }

        Ok(())
    }

    pub fn validate_path(
        &self,
        start_id: &str,
        end_id: &str,
        path_name: &str,
        template_name: &str,
    ) -> bool {
        let result = self.try_validate_path(start_id, end_id, path_name, template_name);
        self.report("validate_path", result)
    }

    /// Add a path from `start_id` to `end_id` carrying a copy of
    /// `template_name` named `path_name`.
    pub fn try_add_path(
        &mut self,
        start_id: &str,
        end_id: &str,
        path_name: &str,
        template_name: &str,
    ) -> StoryResult<()> {
        self.try_validate_path(start_id, end_id, path_name, template_name)?;

        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| StoryError::MissingReference {
                kind: ReferenceKind::Template,
                id: template_name.to_string(),
                options: self.templates.keys().cloned().collect(),
            })?;
        let embedding = template.duplicate(path_name)?;

        let key = PathKey::new(start_id, end_id);
        tracing::debug!(
            graph = %self.name,
            path = %key,
            name = %path_name,
            template = %template_name,
            "added path"
        );
        self.path_index.insert(key.clone(), self.paths.len());
        self.paths.push((key, embedding));
        Ok(())
    }

    /// Add a path using the default (all-zero) template.
    pub fn add_path(&mut self, start_id: &str, end_id: &str, path_name: &str) -> bool {
        self.add_path_with_template(start_id, end_id, path_name, DEFAULT_TEMPLATE)
    }

    pub fn add_path_with_template(
        &mut self,
        start_id: &str,
        end_id: &str,
        path_name: &str,
        template_name: &str,
    ) -> bool {
        let result = self.try_add_path(start_id, end_id, path_name, template_name);
        self.report("add_path", result)
    }

    /// Fold more example replies into a path's embedding.
    pub fn try_tune_path<S: AsRef<str>>(
        &mut self,
        key: &PathKey,
        examples: &[S],
    ) -> StoryResult<&[f32]> {
        self.ensure_open()?;
        let index = match self.path_index.get(key) {
            Some(index) => *index,
            None => {
                return Err(StoryError::MissingReference {
                    kind: ReferenceKind::Path,
                    id: key.to_string(),
                    options: self.paths.iter().map(|(key, _)| key.to_string()).collect(),
                })
            }
        };

        let (_, embedding) = &mut self.paths[index];
        embedding.tune(examples)
    }

    pub fn tune_path<S: AsRef<str>>(&mut self, key: &PathKey, examples: &[S]) -> bool {
        let result = self.try_tune_path(key, examples).map(|_| ());
        self.report("tune_path", result)
    }

    /// Register an extra rule every new path must pass.
    pub fn try_add_rule(&mut self, rule: impl PathRule + 'static) -> StoryResult<()> {
        self.ensure_open()?;
        tracing::debug!(graph = %self.name, rule = rule.name(), "registered path rule");
        self.rules.push(Box::new(rule));
        Ok(())
    }

    pub fn add_rule(&mut self, rule: impl PathRule + 'static) -> bool {
        let result = self.try_add_rule(rule);
        self.report("add_rule", result)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_locked(&self) -> bool {
        self.tuning.is_locked()
    }

    pub fn embedding_fn(&self) -> Option<&EmbeddingFn> {
        self.tuning.embedding_fn()
    }

    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn template(&self, name: &str) -> Option<&PathEmbedding> {
        self.templates.get(name)
    }

    /// All templates, ordered by name.
    pub fn templates(&self) -> impl Iterator<Item = &PathEmbedding> {
        self.templates.values()
    }

    /// Names of every template.
    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn path(&self, key: &PathKey) -> Option<&PathEmbedding> {
        self.path_index.get(key).map(|index| &self.paths[*index].1)
    }

    pub fn has_path(&self, key: &PathKey) -> bool {
        self.path_index.contains_key(key)
    }

    /// All paths in the order they were added.
    pub fn paths(&self) -> impl Iterator<Item = (&PathKey, &PathEmbedding)> {
        self.paths.iter().map(|(key, embedding)| (key, embedding))
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Ids of the nodes reachable in one step from `id`, in path order.
    pub fn reachable(&self, id: &str) -> Vec<&str> {
        self.paths
            .iter()
            .filter(|(key, _)| key.start() == id)
            .map(|(key, _)| key.end())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Raw inserts for document loading (no validation)
    // -----------------------------------------------------------------------

    pub(crate) fn insert_template(&mut self, template: PathEmbedding) {
        self.templates.insert(template.name().to_string(), template);
    }

    pub(crate) fn insert_node(&mut self, node: StoryNode) {
        self.nodes.insert(node.id().to_string(), node);
    }

    pub(crate) fn insert_path(&mut self, key: PathKey, embedding: PathEmbedding) {
        self.path_index.insert(key.clone(), self.paths.len());
        self.paths.push((key, embedding));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_open(&self) -> StoryResult<&EmbeddingFn> {
        match &self.tuning {
            Tuning::Open(embedding_fn) => Ok(embedding_fn),
            Tuning::Locked => Err(StoryError::GraphLocked(self.name.clone())),
        }
    }

    /// Whether `name` is taken anywhere in the template + path namespace.
    fn name_in_use(&self, name: &str) -> bool {
        self.templates.contains_key(name) || self.paths.iter().any(|(_, e)| e.name() == name)
    }

    fn report(&self, operation: &'static str, result: StoryResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    graph = %self.name,
                    operation,
                    error = %e,
                    "story graph operation rejected"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for StoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryGraph")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("locked", &self.is_locked())
            .field("nodes", &self.nodes.len())
            .field("templates", &self.templates.len())
            .field("paths", &self.paths.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}
