//! # Story Core
//!
//! The authoring engine of Lifelike. A story is a directed graph of beats
//! ("nodes") joined by paths; which path the player takes is decided by
//! comparing the embedding of their free-text reply with the embedding each
//! path carries.
//!
//! ## Core Components
//!
//! - **graph**: The story graph, its authoring API and validation rules
//! - **document**: Round-trippable documents and atomic save/load
//! - **export**: Flat records for an external nearest-neighbour index
//! - **config**: TOML configuration for creating and resuming graphs
//!
//! ## Design Philosophy
//!
//! - **Append-only**: Nodes, templates and paths are only ever added, so exported paths stay valid
//! - **Lock once**: A graph without an embedding function is final and can never drift
//! - **Retry-friendly**: Authoring mistakes are reported, never fatal, and never change the graph

pub mod config;
pub mod document;
pub mod export;
pub mod graph;

pub use config::*;
pub use document::*;
pub use export::*;
pub use graph::*;

pub use story_model::*;
