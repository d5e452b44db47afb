//! # Story Model
//!
//! The "Story Bible" crate - the value types every Lifelike story is built
//! from. This crate knows nothing about graphs or persistence.
//!
//! ## Core Components
//!
//! - **node**: Story nodes (beats) and the directed keys of paths between them
//! - **embedding**: The pluggable embedding function and per-path vector statistics
//! - **error**: The error taxonomy shared by all story crates

pub mod embedding;
pub mod error;
pub mod node;

pub use embedding::*;
pub use error::*;
pub use node::*;
