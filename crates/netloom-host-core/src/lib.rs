// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The Netloom host core: a revisioned, transactional command processor
//! over one topology document and its annotations sidecar.
//!
//! One [`TopologyHost`] owns the canonical on-disk state, serves immutable
//! snapshots to renderers, applies mutation commands all-or-nothing across
//! both files, and keeps linear undo/redo history with merge-coalescing
//! for rapid edits. The revision counter is the sole concurrency token:
//! callers are expected to serialize their requests and rebase on the
//! attached snapshot whenever a command comes back stale.

use std::time::Duration;

use netloom_annotations::AnnotationsError;
use netloom_fs::FsError;
use netloom_graph::GraphMode;
use netloom_topo::TopoError;
use thiserror::Error;

mod history;
mod host;

pub use history::HistoryEntry;
pub use host::TopologyHost;

/// Errors emitted by the host core.
///
/// These never cross the command protocol directly: [`TopologyHost::apply`]
/// translates every failure into an error response.
#[derive(Debug, Error)]
pub enum HostError {
    /// Storage-layer failure.
    #[error(transparent)]
    Fs(#[from] FsError),
    /// Topology document failure (parse or CRUD).
    #[error(transparent)]
    Topo(#[from] TopoError),
    /// Annotations persistence failure.
    #[error(transparent)]
    Annotations(#[from] AnnotationsError),
    /// A batch contained a nested batch or an undo/redo command.
    #[error("batch commands may not nest or contain undo/redo")]
    InvalidBatch,
}

/// Host configuration, injected at construction.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Maximum retained undo (and redo) steps; oldest entries are evicted
    /// first.
    pub history_limit: usize,
    /// How long a rename keeps the history merge window open. Zero
    /// disables coalescing.
    pub merge_window: Duration,
    /// Operating mode for snapshot builds.
    pub mode: GraphMode,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            merge_window: Duration::from_millis(400),
            mode: GraphMode::Edit,
        }
    }
}
