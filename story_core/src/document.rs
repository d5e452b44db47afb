//! Story documents - the persisted, round-trippable form of a [`StoryGraph`].
//!
//! A saved document together with an (optional) embedder rebuilds an
//! identical graph, so authoring can stop and resume at any point.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::GraphConfig;
use crate::graph::StoryGraph;
use story_model::{
    Embedder, EmbeddingSnapshot, PathEmbedding, PathKey, StoryError, StoryNode, StoryResult,
};

/// One path in a document: its edge plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    /// `[start_id, end_id]`.
    pub edge: PathKey,

    #[serde(flatten)]
    pub embedding: EmbeddingSnapshot,
}

/// The persisted form of a story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDocument {
    pub name: String,
    pub dimension: usize,
    pub templates: BTreeMap<String, EmbeddingSnapshot>,
    pub nodes: BTreeMap<String, StoryNode>,

    /// In the order the paths were added.
    pub paths: Vec<PathRecord>,
}

/// Converts graphs to and from documents, JSON and files.
#[derive(Debug, Clone)]
pub struct Serializer {
    pretty: bool,
}

impl Default for Serializer {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Serializer {
    /// Serializer writing pretty-printed JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer writing compact JSON.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            pretty: config.pretty,
        }
    }

    /// Snapshot the graph.
    pub fn to_document(graph: &StoryGraph) -> StoryDocument {
        StoryDocument {
            name: graph.name().to_string(),
            dimension: graph.dimension(),
            templates: graph
                .templates()
                .map(|t| (t.name().to_string(), t.snapshot()))
                .collect(),
            nodes: graph
                .nodes()
                .map(|n| (n.id().to_string(), n.clone()))
                .collect(),
            paths: graph
                .paths()
                .map(|(key, embedding)| PathRecord {
                    edge: key.clone(),
                    embedding: embedding.snapshot(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a document.
    ///
    /// Templates, nodes and paths are inserted directly, without the authoring
    /// checks, so a locked graph can be reloaded. Structure that cannot belong
    /// to any valid graph is still rejected as [`StoryError::CorruptDocument`].
    pub fn from_document(
        document: StoryDocument,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<StoryGraph> {
        let StoryDocument {
            name,
            dimension,
            templates,
            nodes,
            paths,
        } = document;

        let mut graph = StoryGraph::new(name, dimension, embedder).map_err(|e| match e {
            StoryError::InvalidArgument(message) => StoryError::CorruptDocument(message),
            other => other,
        })?;
        let embedding_fn = graph.embedding_fn().cloned();
        let mut names = HashSet::new();

        for (key, snapshot) in templates {
            if key != snapshot.name {
                return Err(StoryError::CorruptDocument(format!(
                    "template '{}' is stored under key '{}'",
                    snapshot.name, key
                )));
            }
            let template = PathEmbedding::from_snapshot(snapshot, dimension, embedding_fn.clone())
                .map_err(corrupt)?;
            names.insert(key);
            graph.insert_template(template);
        }

        for (key, node) in nodes {
            if node.id().is_empty() || key != node.id() {
                return Err(StoryError::CorruptDocument(format!(
                    "node '{}' is stored under key '{}'",
                    node.id(),
                    key
                )));
            }
            graph.insert_node(node);
        }

        for record in paths {
            let edge = record.edge;
            if edge.is_self_loop() {
                return Err(StoryError::CorruptDocument(format!("self-loop path {edge}")));
            }
            if let Some(missing) = [edge.start(), edge.end()]
                .into_iter()
                .find(|id| graph.node(id).is_none())
            {
                return Err(StoryError::CorruptDocument(format!(
                    "path {edge} refers to unknown node '{missing}'"
                )));
            }
            if graph.has_path(&edge) {
                return Err(StoryError::CorruptDocument(format!("duplicate path {edge}")));
            }
            if !names.insert(record.embedding.name.clone()) {
                return Err(StoryError::CorruptDocument(format!(
                    "path {edge} reuses the name '{}'",
                    record.embedding.name
                )));
            }

            let embedding =
                PathEmbedding::from_snapshot(record.embedding, dimension, embedding_fn.clone())
                    .map_err(corrupt)?;
            graph.insert_path(edge, embedding);
        }

        Ok(graph)
    }

    /// Serialize the graph to a JSON string.
    pub fn to_json(&self, graph: &StoryGraph) -> StoryResult<String> {
        let document = Self::to_document(graph);
        let json = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };
        json.map_err(|e| StoryError::CorruptDocument(format!("serialize: {e}")))
    }

    /// Rebuild a graph from a JSON string.
    pub fn from_json_str(
        json: &str,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<StoryGraph> {
        let document: StoryDocument =
            serde_json::from_str(json).map_err(|e| StoryError::CorruptDocument(e.to_string()))?;
        Self::from_document(document, embedder)
    }

    /// Write the graph to `path`.
    ///
    /// The document is written to a temporary sibling file first and renamed
    /// over `path`, so readers see either the old file or the complete new one.
    pub fn save(&self, graph: &StoryGraph, path: impl AsRef<Path>) -> StoryResult<()> {
        let path = path.as_ref();
        let json = self.to_json(graph)?;
        let tmp = temp_path(path)?;

        let written = File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, path));

        if let Err(source) = written {
            // Best effort; report the write failure, not the cleanup.
            let _ = fs::remove_file(&tmp);
            return Err(StoryError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        tracing::info!(
            graph = %graph.name(),
            path = %path.display(),
            nodes = graph.node_count(),
            paths = graph.path_count(),
            "saved story graph"
        );
        Ok(())
    }

    /// Read a graph from `path`.
    pub fn load(
        path: impl AsRef<Path>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<StoryGraph> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| StoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph = Self::from_json_str(&json, embedder)?;

        tracing::info!(
            graph = %graph.name(),
            path = %path.display(),
            nodes = graph.node_count(),
            paths = graph.path_count(),
            locked = graph.is_locked(),
            "loaded story graph"
        );
        Ok(graph)
    }

    /// Resume the graph at `config.document_path`, or start a new one if no
    /// document has been saved there yet.
    pub fn load_or_create(
        config: &GraphConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> StoryResult<StoryGraph> {
        let path = match &config.document_path {
            Some(path) if path.exists() => path,
            _ => return StoryGraph::from_config(config, embedder),
        };

        let graph = Self::load(path, embedder)?;
        if graph.name() != config.name || graph.dimension() != config.dimension {
            return Err(StoryError::Config(format!(
                "document {} holds graph '{}' ({} dims), config expects '{}' ({} dims)",
                path.display(),
                graph.name(),
                graph.dimension(),
                config.name,
                config.dimension
            )));
        }
        Ok(graph)
    }

    /// Save to `config.document_path`.
    pub fn save_configured(&self, graph: &StoryGraph, config: &GraphConfig) -> StoryResult<()> {
        let path = config
            .document_path
            .as_ref()
            .ok_or_else(|| StoryError::Config("document_path is not set".to_string()))?;
        self.save(graph, path)
    }
}

fn corrupt(error: StoryError) -> StoryError {
    match error {
        StoryError::InvalidArgument(message) => StoryError::CorruptDocument(message),
        other => other,
    }
}

fn temp_path(path: &Path) -> StoryResult<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        StoryError::InvalidArgument(format!("{} is not a file path", path.display()))
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DEFAULT_TEMPLATE;
    use serde_json::json;
    use story_model::EmbedError;

    /// Embeds a text as `[len, vowels, 1]`.
    fn shape_embedder() -> Arc<dyn Embedder> {
        Arc::new(|texts: &[&str]| -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    vec![t.len() as f32, vowels as f32, 1.0]
                })
                .collect())
        })
    }

    fn sample_graph() -> StoryGraph {
        let mut graph = StoryGraph::new("cool_dad", 3, Some(shape_embedder())).unwrap();
        graph.add_node(
            StoryNode::new("door", "You knock on the door.")
                .unwrap()
                .with_metadata(json!({ "requirements": { "trust": 2 }, "tags": ["intro"] })),
        );
        graph.add_node(StoryNode::new("hall|way", "Dad lets you in.").unwrap());
        graph.add_node(StoryNode::new("street", "Dad slams the door.").unwrap());
        graph.add_embedding_template("polite", &["good evening sir", "hello"]);
        graph.add_path_with_template("door", "hall|way", "door_to_hall", "polite");
        graph.add_path("door", "street", "door_to_street");
        graph.tune_path(&PathKey::new("door", "street"), &["go away", "whatever, old man"]);
        graph
    }

    #[test]
    fn test_document_shape() {
        let value = serde_json::to_value(Serializer::to_document(&sample_graph())).unwrap();

        assert_eq!(value["name"], "cool_dad");
        assert_eq!(value["dimension"], 3);
        assert_eq!(value["templates"]["default"]["weight"], 0);
        assert_eq!(value["nodes"]["door"]["metadata"]["requirements"]["trust"], 2);
        assert_eq!(value["paths"][0]["edge"], json!(["door", "hall|way"]));
        assert_eq!(value["paths"][0]["name"], "door_to_hall");
        assert_eq!(value["paths"][1]["weight"], 2);
    }

    #[test]
    fn test_round_trip_with_embedder() {
        let graph = sample_graph();
        let document = Serializer::to_document(&graph);

        let restored = Serializer::from_document(document.clone(), Some(shape_embedder())).unwrap();
        assert!(!restored.is_locked());
        assert_eq!(Serializer::to_document(&restored), document);

        let path = PathKey::new("door", "street");
        assert_eq!(restored.path(&path).unwrap().vector(), graph.path(&path).unwrap().vector());
        assert_eq!(restored.path(&path).unwrap().weight(), 2);
        assert_eq!(restored.node("door"), graph.node("door"));
        assert_eq!(restored.reachable("door"), vec!["hall|way", "street"]);
    }

    #[test]
    fn test_round_trip_without_embedder_locks() {
        let graph = sample_graph();
        let json = Serializer::new().to_json(&graph).unwrap();

        let mut restored = Serializer::from_json_str(&json, None).unwrap();
        assert!(restored.is_locked());
        assert_eq!(Serializer::to_document(&restored), Serializer::to_document(&graph));
        assert!(!restored.tune_path(&PathKey::new("door", "street"), &["hi"]));
        assert!(restored.path(&PathKey::new("door", "street")).unwrap().is_locked());
    }

    #[test]
    fn test_resumed_graph_keeps_tuning() {
        let graph = sample_graph();
        let json = Serializer::compact().to_json(&graph).unwrap();

        let mut resumed = Serializer::from_json_str(&json, Some(shape_embedder())).unwrap();
        let key = PathKey::new("door", "street");
        assert!(resumed.tune_path(&key, &["no"]));
        assert_eq!(resumed.path(&key).unwrap().weight(), 3);

        // "go away" [7,3,1], "whatever, old man" [17,5,1], "no" [2,1,1]
        let vector = resumed.path(&key).unwrap().vector();
        assert!((vector[0] - 26.0 / 3.0).abs() < 1e-4);
        assert!((vector[1] - 3.0).abs() < 1e-4);
        assert!((vector[2] - 1.0).abs() < 1e-6);

        assert!(resumed.add_node(StoryNode::new("attic", "").unwrap()));
        assert!(!resumed.add_path("door", "street", "again"));
    }

    #[test]
    fn test_repeated_serialization_is_identical() {
        let graph = sample_graph();
        let serializer = Serializer::new();
        assert_eq!(serializer.to_json(&graph).unwrap(), serializer.to_json(&graph).unwrap());

        let restored =
            Serializer::from_json_str(&serializer.to_json(&graph).unwrap(), None).unwrap();
        assert_eq!(serializer.to_json(&restored).unwrap(), serializer.to_json(&graph).unwrap());
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let mut value = serde_json::to_value(Serializer::to_document(&sample_graph())).unwrap();
        value.as_object_mut().unwrap().remove("nodes");

        let err = Serializer::from_json_str(&value.to_string(), None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));
    }

    #[test]
    fn test_bad_edge_key_is_corrupt() {
        let mut value = serde_json::to_value(Serializer::to_document(&sample_graph())).unwrap();
        value["paths"][0]["edge"] = json!(["door", "hall|way", "street"]);
        let err = Serializer::from_json_str(&value.to_string(), None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));

        value["paths"][0]["edge"] = json!("door hall|way");
        let err = Serializer::from_json_str(&value.to_string(), None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));
    }

    #[test]
    fn test_dangling_path_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        document.nodes.remove("street");

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("street")));
    }

    #[test]
    fn test_template_under_wrong_key_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        let polite = document.templates.remove("polite").unwrap();
        document.templates.insert("rude".to_string(), polite);

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("rude")));
    }

    #[test]
    fn test_node_under_wrong_key_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        let street = document.nodes.remove("street").unwrap();
        document.nodes.insert("alley".to_string(), street);

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("alley")));
    }

    #[test]
    fn test_self_loop_path_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        document.paths[1].edge = PathKey::new("door", "door");

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("self-loop")));
    }

    #[test]
    fn test_duplicate_edge_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        document.paths[1].edge = PathKey::new("door", "hall|way");
        document.paths[1].embedding.name = "door_to_hall_again".to_string();

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_reused_name_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        document.paths[0].embedding.name = DEFAULT_TEMPLATE.to_string();
        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("default")));

        let mut document = Serializer::to_document(&sample_graph());
        document.paths[1].embedding.name = "door_to_hall".to_string();
        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(msg) if msg.contains("door_to_hall")));
    }

    #[test]
    fn test_max_weight_path_refuses_tuning() {
        let mut document = Serializer::to_document(&sample_graph());
        document.paths[1].embedding.weight = u64::MAX;
        let json = serde_json::to_string(&document).unwrap();

        let mut graph = Serializer::from_json_str(&json, Some(shape_embedder())).unwrap();
        let key = PathKey::new("door", "street");
        let before = graph.path(&key).unwrap().vector().to_vec();

        let err = graph.try_tune_path(&key, &["x"]).unwrap_err();
        assert!(matches!(err, StoryError::WeightOverflow(ref name) if name == "door_to_street"));
        assert!(!graph.tune_path(&key, &["x"]));
        assert_eq!(graph.path(&key).unwrap().weight(), u64::MAX);
        assert_eq!(graph.path(&key).unwrap().vector(), before.as_slice());
    }

    #[test]
    fn test_wrong_vector_length_is_corrupt() {
        let mut document = Serializer::to_document(&sample_graph());
        document.paths[1].embedding.vector.push(0.5);

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));
    }

    #[test]
    fn test_zero_dimension_is_corrupt() {
        let mut document = Serializer::to_document(&StoryGraph::new("cool_dad", 3, None).unwrap());
        document.dimension = 0;
        document.templates.clear();

        let err = Serializer::from_document(document, None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));
    }

    #[test]
    fn test_empty_default_template_uses_graph_dimension() {
        let json = r#"{
            "name": "cool_dad",
            "dimension": 4,
            "templates": { "default": { "name": "default", "vector": [], "weight": 0 } },
            "nodes": {},
            "paths": []
        }"#;
        let graph = Serializer::from_json_str(json, None).unwrap();
        assert_eq!(graph.template(DEFAULT_TEMPLATE).unwrap().vector(), &[0.0; 4]);
    }

    #[test]
    fn test_load_keeps_existing_graph_on_failure() {
        let graph = sample_graph();
        let err = Serializer::from_json_str("{ not json", None).unwrap_err();
        assert!(matches!(err, StoryError::CorruptDocument(_)));
        assert_eq!(graph.path_count(), 2);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dad.json");
        let graph = sample_graph();

        Serializer::new().save(&graph, &path).unwrap();
        let loaded = Serializer::load(&path, Some(shape_embedder())).unwrap();
        assert_eq!(Serializer::to_document(&loaded), Serializer::to_document(&graph));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("dad.json")]);
    }

    #[test]
    fn test_save_replaces_previous_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dad.json");
        let mut graph = sample_graph();
        let serializer = Serializer::new();

        serializer.save(&graph, &path).unwrap();
        graph.add_node(StoryNode::new("attic", "Dusty boxes.").unwrap());
        serializer.save(&graph, &path).unwrap();

        let loaded = Serializer::load(&path, None).unwrap();
        assert!(loaded.node("attic").is_some());
    }

    #[test]
    fn test_save_failure_leaves_no_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing_dir").join("dad.json");

        let err = Serializer::new().save(&sample_graph(), &path).unwrap_err();
        assert!(matches!(err, StoryError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Serializer::load("/definitely/not/here.json", None).unwrap_err();
        assert!(matches!(err, StoryError::Io { .. }));
    }

    #[test]
    fn test_load_or_create_resumes() {
        let dir = tempfile::TempDir::new().unwrap();
        let config =
            GraphConfig::new("cool_dad", 3).with_document_path(dir.path().join("dad.json"));

        let fresh = Serializer::load_or_create(&config, Some(shape_embedder())).unwrap();
        assert_eq!(fresh.node_count(), 0);

        let graph = sample_graph();
        Serializer::from_config(&config).save_configured(&graph, &config).unwrap();

        let resumed = Serializer::load_or_create(&config, Some(shape_embedder())).unwrap();
        assert_eq!(resumed.node_count(), 3);

        let other = GraphConfig::new("cool_dad", 5).with_document_path(dir.path().join("dad.json"));
        let err = Serializer::load_or_create(&other, None).unwrap_err();
        assert!(matches!(err, StoryError::Config(_)));
    }

    #[test]
    fn test_save_configured_requires_path() {
        let config = GraphConfig::new("cool_dad", 3);
        let err = Serializer::from_config(&config)
            .save_configured(&sample_graph(), &config)
            .unwrap_err();
        assert!(matches!(err, StoryError::Config(_)));
    }
}
