//! Database export - flattens a story graph into records for an external
//! nearest-neighbour index.
//!
//! Each path becomes one record keyed by its *destination* node: the index is
//! queried with the embedding of a player's reply and answers with the node
//! the story should move to.

use serde::{Deserialize, Serialize};

use crate::graph::StoryGraph;
use story_model::{StoryError, StoryResult};

/// Extra data stored alongside each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Nodes reachable from the destination.
    pub reachable: Vec<String>,

    /// The destination's reaction text.
    pub reaction: String,
}

/// One entry for the external index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Destination node id.
    pub id: String,
    pub vector: Vec<f32>,
    /// Destination label.
    pub document: String,
    pub metadata: RecordMetadata,
}

/// Client for an external nearest-neighbour store.
///
/// Passed explicitly to every call that needs one.
pub trait IndexClient {
    fn add(
        &mut self,
        collection: &str,
        records: Vec<IndexRecord>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Projects story graphs into index records.
pub struct DatabaseExporter;

impl DatabaseExporter {
    /// One record per path, in path order. The graph is not modified.
    pub fn export(graph: &StoryGraph) -> Vec<IndexRecord> {
        graph
            .paths()
            .filter_map(|(key, embedding)| {
                let Some(target) = graph.node(key.end()) else {
                    tracing::warn!(
                        graph = %graph.name(),
                        path = %key,
                        "path leads to unknown node, skipping"
                    );
                    return None;
                };
                Some(IndexRecord {
                    id: target.id().to_string(),
                    vector: embedding.vector().to_vec(),
                    document: target.label().to_string(),
                    metadata: RecordMetadata {
                        reachable: graph
                            .reachable(target.id())
                            .into_iter()
                            .map(String::from)
                            .collect(),
                        reaction: target.context().to_string(),
                    },
                })
            })
            .collect()
    }

    /// Export the graph into `client` under the graph's name.
    ///
    /// Returns how many records were handed over.
    pub fn write<C: IndexClient + ?Sized>(
        graph: &StoryGraph,
        client: &mut C,
    ) -> StoryResult<usize> {
        let records = Self::export(graph);
        let count = records.len();
        if count == 0 {
            tracing::info!(graph = %graph.name(), "no paths to export");
            return Ok(0);
        }

        client
            .add(graph.name(), records)
            .map_err(|e| StoryError::Index {
                collection: graph.name().to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(graph = %graph.name(), records = count, "exported story graph to index");
        Ok(count)
    }
}
