// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Topology document model and store for Netloom.
//!
//! The primary document is YAML: a lab name, optional prefix and
//! management block, and a topology body of nodes and links. Reads go
//! through a typed view ([`TopologyFile`]); mutations go through
//! [`TopoDocStore`], which edits an order-preserving `serde_yaml` tree in
//! place so untouched keys survive round-trips.

use std::path::PathBuf;

use netloom_fs::FsError;
use thiserror::Error;

mod model;
mod store;
mod tree;

pub use model::{
    default_interface_pattern, labels, parse, parse_tree, split_endpoint, typed_view,
    LabSettings, LinkDef, NodeDef, Topology, TopologyFile,
};
pub use store::{PositionEntry, TopoDocStore};

/// Errors emitted by topology parsing and the document store.
#[derive(Debug, Error)]
pub enum TopoError {
    /// The document text failed to parse or did not match the schema.
    #[error("topology parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The document root is not a YAML mapping.
    #[error("topology document root must be a mapping: {}", .0.display())]
    NotAMapping(PathBuf),
    /// An operation requires an initialized store.
    #[error("document store not initialized")]
    NotInitialized,
    /// A node id was added twice.
    #[error("node already exists: {0}")]
    NodeExists(String),
    /// A referenced node id does not exist.
    #[error("node not found: {0}")]
    NodeMissing(String),
    /// A link index was out of range.
    #[error("link index out of range: {0}")]
    LinkMissing(usize),
    /// `begin_batch` was called while a batch was already open.
    #[error("batch already open")]
    BatchActive,
    /// `end_batch` was called with no open batch.
    #[error("no batch open")]
    NoBatch,
    /// Underlying storage failure.
    #[error(transparent)]
    Fs(#[from] FsError),
}
