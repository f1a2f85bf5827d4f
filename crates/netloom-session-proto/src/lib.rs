// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for the Netloom host (renderer ↔ host).
//!
//! Every mutating request carries the revision it was computed against;
//! the host answers with an ack, a stale rejection, or an error — never a
//! raw exception. Snapshot pushes cover the cases where host state moves
//! without a direct command.

pub use netloom_annotations::{
    AnnotationsDoc, EdgeAnnotation, FreeShapeAnnotation, FreeTextAnnotation, GeoCoordinates,
    GroupStyleAnnotation, NetworkNodeAnnotation, NodeAnnotation, Position, ViewerSettings,
};
pub use netloom_graph::{DeployState, GraphMode, TopoGraph};
pub use netloom_topo::{LabSettings, LinkDef, NodeDef};

use serde::{Deserialize, Serialize};

/// Monotonic revision number; the sole optimistic-concurrency token.
pub type Revision = u64;

/// Position update for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePosition {
    /// Node id.
    pub id: String,
    /// Canvas position.
    pub position: Position,
    /// Optional geographic position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_coordinates: Option<GeoCoordinates>,
}

/// Group-box membership update for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    /// Node id.
    pub node_id: String,
    /// Target group id; `None` removes the node from its group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// A mutating command, dispatched exhaustively by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// Add a node declaration.
    AddNode {
        /// New node id.
        id: String,
        /// Node declaration.
        node: NodeDef,
    },
    /// Replace (and optionally rename) a node declaration.
    EditNode {
        /// Existing node id.
        id: String,
        /// New id when renaming.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rename_to: Option<String>,
        /// Replacement declaration.
        node: NodeDef,
    },
    /// Delete a node declaration (and links referencing it).
    DeleteNode {
        /// Node id.
        id: String,
    },
    /// Append a link declaration.
    AddLink {
        /// Link declaration.
        link: LinkDef,
    },
    /// Replace the link at `index`.
    EditLink {
        /// Zero-based index in document order.
        index: usize,
        /// Replacement declaration.
        link: LinkDef,
    },
    /// Remove the link at `index`.
    DeleteLink {
        /// Zero-based index in document order.
        index: usize,
    },
    /// Persist node positions.
    SavePositions {
        /// Position updates.
        positions: Vec<NodePosition>,
    },
    /// Persist node positions and replace the annotations document in one
    /// step (end-of-drag commit).
    SavePositionsAndAnnotations {
        /// Position updates.
        positions: Vec<NodePosition>,
        /// Full replacement annotations document.
        annotations: AnnotationsDoc,
    },
    /// Replace the annotations document wholesale.
    SetAnnotations {
        /// Full replacement annotations document.
        annotations: AnnotationsDoc,
    },
    /// Replace the annotations document and apply group memberships on
    /// top of it.
    SetAnnotationsWithMemberships {
        /// Full replacement annotations document.
        annotations: AnnotationsDoc,
        /// Membership updates applied after the replacement.
        memberships: Vec<GroupMembership>,
    },
    /// Replace the edge-annotation collection.
    SetEdgeAnnotations {
        /// Full replacement edge annotations.
        edges: Vec<EdgeAnnotation>,
    },
    /// Replace the viewer-wide settings.
    SetViewerSettings {
        /// New viewer settings.
        settings: ViewerSettings,
    },
    /// Update one node's group membership.
    SetNodeGroupMembership(GroupMembership),
    /// Update several nodes' group memberships.
    SetNodeGroupMemberships {
        /// Membership updates.
        memberships: Vec<GroupMembership>,
    },
    /// Update lab-level settings (name, prefix, management block).
    SetLabSettings {
        /// New settings.
        settings: LabSettings,
    },
    /// Apply an ordered list of sub-commands as one logical mutation.
    /// Batches may not nest and may not contain undo/redo.
    Batch {
        /// Sub-commands, applied in order.
        commands: Vec<Command>,
    },
    /// Revert the most recent undoable mutation.
    Undo,
    /// Re-apply the most recently undone mutation.
    Redo,
}

impl Command {
    /// Stable command name, matching the wire tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "addNode",
            Self::EditNode { .. } => "editNode",
            Self::DeleteNode { .. } => "deleteNode",
            Self::AddLink { .. } => "addLink",
            Self::EditLink { .. } => "editLink",
            Self::DeleteLink { .. } => "deleteLink",
            Self::SavePositions { .. } => "savePositions",
            Self::SavePositionsAndAnnotations { .. } => "savePositionsAndAnnotations",
            Self::SetAnnotations { .. } => "setAnnotations",
            Self::SetAnnotationsWithMemberships { .. } => "setAnnotationsWithMemberships",
            Self::SetEdgeAnnotations { .. } => "setEdgeAnnotations",
            Self::SetViewerSettings { .. } => "setViewerSettings",
            Self::SetNodeGroupMembership(_) => "setNodeGroupMembership",
            Self::SetNodeGroupMemberships { .. } => "setNodeGroupMemberships",
            Self::SetLabSettings { .. } => "setLabSettings",
            Self::Batch { .. } => "batch",
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    /// Reports whether this command may appear inside a batch.
    #[must_use]
    pub fn batchable(&self) -> bool {
        !matches!(self, Self::Batch { .. } | Self::Undo | Self::Redo)
    }

    /// Reports whether this edit is a rename (old and new id both present
    /// and different) — the trigger for history merge-coalescing.
    #[must_use]
    pub fn is_rename(&self) -> bool {
        matches!(
            self,
            Self::EditNode {
                id,
                rename_to: Some(new_id),
                ..
            } if !id.is_empty() && !new_id.is_empty() && id != new_id
        )
    }
}

/// A mutating request from a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// The revision the renderer computed this command against.
    pub base_revision: Revision,
    /// Skip the undo history for this mutation (ephemeral drag saves).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_history: bool,
    /// The command itself.
    #[serde(flatten)]
    pub command: Command,
}

/// Why a command was rejected without mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// `baseRevision` did not match the current revision; re-fetch the
    /// snapshot and retry.
    Stale,
}

/// Host response to a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandResponse {
    /// The mutation committed.
    Ack {
        /// Revision after the mutation.
        revision: Revision,
        /// Snapshot at that revision.
        snapshot: TopologySnapshot,
    },
    /// The command was rejected; nothing was mutated.
    Rejected {
        /// Rejection reason.
        reason: RejectReason,
        /// Current revision.
        revision: Revision,
        /// Current snapshot, for the caller to rebase on.
        snapshot: TopologySnapshot,
    },
    /// The command failed; revision and history are unchanged.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// Why a snapshot was pushed without a direct command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushReason {
    /// First snapshot after a renderer attached.
    Init,
    /// The primary document changed outside the command protocol.
    ExternalChange,
    /// The renderer asked for a resynchronization.
    Resync,
}

/// Out-of-band snapshot notification (host → renderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPush {
    /// Why the push happened.
    pub reason: PushReason,
    /// The current snapshot.
    pub snapshot: TopologySnapshot,
}

/// Immutable, fully-resolved view of the topology for renderers.
///
/// Always internally consistent with its revision and replaced wholesale,
/// never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    /// Revision this snapshot reflects.
    pub revision: Revision,
    /// Operating mode of the host.
    pub mode: GraphMode,
    /// Deployment state of the lab.
    pub deploy_state: DeployState,
    /// Primary document name (lab name).
    pub lab_name: String,
    /// Resolved render graph.
    pub graph: TopoGraph,
    /// Normalized annotations (every collection present).
    pub annotations: AnnotationsDoc,
    /// Lab-level settings extracted from the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_settings: Option<LabSettings>,
    /// Whether an undo step is available.
    pub can_undo: bool,
    /// Whether a redo step is available.
    pub can_redo: bool,
}
