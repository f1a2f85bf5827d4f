// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The stateful command processor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use netloom_annotations::{AnnotationsDoc, AnnotationsStore};
use netloom_fs::{FsError, FsPort, TxFs};
use netloom_graph::{build_graph, DeployState, LiveStatusPort};
use netloom_migrate as migrate;
use netloom_session_proto::{
    Command, CommandRequest, CommandResponse, GroupMembership, NodePosition, PushReason,
    RejectReason, Revision, SnapshotPush, TopologySnapshot,
};
use netloom_topo::{PositionEntry, TopoDocStore, TopologyFile};

use crate::history::{HistoryEntry, HistoryStacks};
use crate::{HostConfig, HostError};

/// Host-authoritative topology model.
///
/// Owns the revision counter, the snapshot cache, the undo/redo stacks,
/// and the transactional wrapping of every mutating command. All methods
/// take `&mut self`: the host assumes one serialized caller per instance
/// — the revision check is the correctness mechanism, not a lock.
pub struct TopologyHost {
    fs: Arc<TxFs>,
    doc_store: TopoDocStore,
    annotations: AnnotationsStore,
    live: Option<Arc<dyn LiveStatusPort>>,
    topo_path: PathBuf,
    ann_path: PathBuf,
    config: HostConfig,
    revision: Revision,
    snapshot: Option<TopologySnapshot>,
    history: HistoryStacks,
    merge_deadline: Option<Instant>,
}

impl TopologyHost {
    /// Creates a host for the topology document at `topo_path`.
    ///
    /// All I/O flows through `fs` via the host's transactional wrapper;
    /// the sidecar path is derived from `topo_path` by convention.
    #[must_use]
    pub fn new(fs: Arc<dyn FsPort>, topo_path: impl Into<PathBuf>, config: HostConfig) -> Self {
        let topo_path = topo_path.into();
        let ann_path = netloom_annotations::annotations_path(&topo_path);
        let fs = Arc::new(TxFs::new(fs));
        let doc_store = TopoDocStore::new(fs.clone());
        let annotations = AnnotationsStore::new(fs.clone());
        let history = HistoryStacks::new(config.history_limit);
        Self {
            fs,
            doc_store,
            annotations,
            live: None,
            topo_path,
            ann_path,
            config,
            revision: 1,
            snapshot: None,
            history,
            merge_deadline: None,
        }
    }

    /// Attaches a live-status provider for `view`-mode enrichment and
    /// deployment-state resolution.
    #[must_use]
    pub fn with_live_status(mut self, live: Arc<dyn LiveStatusPort>) -> Self {
        self.live = Some(live);
        self
    }

    /// The current revision.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns the cached snapshot, rebuilding it on a cache miss.
    ///
    /// Never changes the revision.
    pub async fn get_snapshot(&mut self) -> Result<TopologySnapshot, HostError> {
        if let Some(snapshot) = &self.snapshot {
            return Ok(snapshot.clone());
        }
        self.rebuild_snapshot().await
    }

    /// Builds the initial snapshot push for a newly attached renderer.
    pub async fn init_push(&mut self) -> Result<SnapshotPush, HostError> {
        let snapshot = self.get_snapshot().await?;
        Ok(SnapshotPush {
            reason: PushReason::Init,
            snapshot,
        })
    }

    /// Builds a resynchronization push on renderer request.
    pub async fn resync_push(&mut self) -> Result<SnapshotPush, HostError> {
        self.snapshot = None;
        self.annotations.clear_cache();
        let snapshot = self.rebuild_snapshot().await?;
        Ok(SnapshotPush {
            reason: PushReason::Resync,
            snapshot,
        })
    }

    /// Applies one mutating request.
    ///
    /// The sequence is fixed: stale check, undo/redo interception, then
    /// the generic transactional path — capture history, begin, dispatch,
    /// commit, invalidate caches, decide history, bump revision, rebuild.
    /// Every failure is translated into a response; revision and history
    /// are untouched on reject and error.
    pub async fn apply(&mut self, request: CommandRequest) -> CommandResponse {
        if request.base_revision != self.revision {
            debug!(
                command = request.command.name(),
                base = request.base_revision,
                current = self.revision,
                "rejecting stale command"
            );
            return match self.get_snapshot().await {
                Ok(snapshot) => CommandResponse::Rejected {
                    reason: RejectReason::Stale,
                    revision: self.revision,
                    snapshot,
                },
                Err(err) => CommandResponse::Error {
                    message: err.to_string(),
                },
            };
        }

        // Undo/redo never enter the generic transactional path.
        match request.command {
            Command::Undo => return self.undo().await,
            Command::Redo => return self.redo().await,
            _ => {}
        }

        match self.apply_mutation(&request).await {
            Ok(snapshot) => CommandResponse::Ack {
                revision: self.revision,
                snapshot,
            },
            Err(err) => {
                warn!(command = request.command.name(), %err, "command failed; rolling back");
                self.recover_after_failure().await;
                CommandResponse::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    /// The primary document changed outside the command protocol.
    ///
    /// Past mutations are no longer valid relative to the new content, so
    /// both history stacks are cleared before the reload.
    pub async fn on_external_change(&mut self) -> Result<SnapshotPush, HostError> {
        info!(path = %self.topo_path.display(), "external change; resynchronizing");
        self.history.clear();
        self.merge_deadline = None;
        self.revision += 1;
        self.snapshot = None;
        self.annotations.clear_cache();
        self.doc_store.initialize_from_file(&self.topo_path).await?;
        let snapshot = self.rebuild_snapshot().await?;
        Ok(SnapshotPush {
            reason: PushReason::ExternalChange,
            snapshot,
        })
    }

    async fn apply_mutation(
        &mut self,
        request: &CommandRequest,
    ) -> Result<TopologySnapshot, HostError> {
        let entry = self.capture_history().await?;
        self.fs.begin()?;
        if !self.doc_store.is_initialized() {
            self.doc_store.initialize_from_file(&self.topo_path).await?;
        }
        self.dispatch(&request.command).await?;
        self.fs.commit().await?;
        self.annotations.clear_cache();

        let merge_active = self
            .merge_deadline
            .is_some_and(|deadline| Instant::now() < deadline);
        if !request.skip_history && !merge_active {
            self.history.push_past(entry);
        }
        // Any committed mutation invalidates forward history.
        self.history.clear_future();
        if request.command.is_rename() {
            self.merge_deadline = Some(Instant::now() + self.config.merge_window);
        } else {
            self.merge_deadline = None;
        }

        self.revision += 1;
        self.rebuild_snapshot().await
    }

    /// Restores a consistent in-memory view after a failed mutation: the
    /// transaction (if still open) is rolled back and both stores reload
    /// from the untouched on-disk state.
    async fn recover_after_failure(&mut self) {
        if self.fs.in_transaction() {
            if let Err(err) = self.fs.rollback() {
                warn!(%err, "rollback failed");
            }
        }
        self.annotations.clear_cache();
        if self.doc_store.is_initialized() {
            if let Err(err) = self.doc_store.initialize_from_file(&self.topo_path).await {
                warn!(%err, "document store reload failed after rollback");
            }
        }
    }

    async fn dispatch(&mut self, command: &Command) -> Result<(), HostError> {
        match command {
            Command::AddNode { id, node } => {
                self.doc_store.add_node(id, node).await?;
            }
            Command::EditNode {
                id,
                rename_to,
                node,
            } => {
                self.doc_store
                    .edit_node(id, rename_to.as_deref(), node)
                    .await?;
                if let Some(new_id) = rename_to.as_deref().filter(|new_id| *new_id != id.as_str()) {
                    let (old_id, new_id) = (id.clone(), new_id.to_owned());
                    self.annotations
                        .modify(&self.ann_path, move |doc| {
                            for entry in &mut doc.node_annotations {
                                if entry.id == old_id {
                                    entry.id = new_id.clone();
                                }
                            }
                        })
                        .await?;
                }
            }
            Command::DeleteNode { id } => {
                self.doc_store.delete_node(id).await?;
                let id = id.clone();
                self.annotations
                    .modify(&self.ann_path, move |doc| {
                        doc.node_annotations.retain(|entry| entry.id != id);
                    })
                    .await?;
            }
            Command::AddLink { link } => {
                self.doc_store.add_link(link).await?;
            }
            Command::EditLink { index, link } => {
                self.doc_store.edit_link(*index, link).await?;
            }
            Command::DeleteLink { index } => {
                self.doc_store.delete_link(*index).await?;
            }
            Command::SavePositions { positions } => {
                self.save_positions(positions).await?;
            }
            Command::SavePositionsAndAnnotations {
                positions,
                annotations,
            } => {
                let mut doc = annotations.clone();
                fold_positions(&mut doc, positions);
                self.annotations.save(&self.ann_path, &doc).await?;
                self.refresh_inline_positions(positions).await?;
            }
            Command::SetAnnotations { annotations } => {
                self.annotations.save(&self.ann_path, annotations).await?;
            }
            Command::SetAnnotationsWithMemberships {
                annotations,
                memberships,
            } => {
                let mut doc = annotations.clone();
                apply_memberships(&mut doc, memberships);
                self.annotations.save(&self.ann_path, &doc).await?;
            }
            Command::SetEdgeAnnotations { edges } => {
                let edges = edges.clone();
                self.annotations
                    .modify(&self.ann_path, move |doc| {
                        doc.edge_annotations = edges;
                    })
                    .await?;
            }
            Command::SetViewerSettings { settings } => {
                let settings = settings.clone();
                self.annotations
                    .modify(&self.ann_path, move |doc| {
                        doc.viewer_settings = Some(settings);
                    })
                    .await?;
            }
            Command::SetNodeGroupMembership(membership) => {
                let memberships = vec![membership.clone()];
                self.annotations
                    .modify(&self.ann_path, move |doc| {
                        apply_memberships(doc, &memberships);
                    })
                    .await?;
            }
            Command::SetNodeGroupMemberships { memberships } => {
                let memberships = memberships.clone();
                self.annotations
                    .modify(&self.ann_path, move |doc| {
                        apply_memberships(doc, &memberships);
                    })
                    .await?;
            }
            Command::SetLabSettings { settings } => {
                self.doc_store.set_lab_settings(settings).await?;
            }
            Command::Batch { commands } => {
                if commands.iter().any(|c| !c.batchable()) {
                    return Err(HostError::InvalidBatch);
                }
                self.doc_store.begin_batch()?;
                for sub in commands {
                    Box::pin(self.dispatch(sub)).await?;
                }
                self.doc_store.end_batch().await?;
            }
            // Intercepted in `apply` and excluded from batches.
            Command::Undo | Command::Redo => return Err(HostError::InvalidBatch),
        }
        Ok(())
    }

    /// Positions canonically live in the sidecar; inline `graph-pos*`
    /// labels are refreshed only where they still exist.
    async fn save_positions(&mut self, positions: &[NodePosition]) -> Result<(), HostError> {
        let updates = positions.to_vec();
        self.annotations
            .modify(&self.ann_path, move |doc| {
                fold_positions(doc, &updates);
            })
            .await?;
        self.refresh_inline_positions(positions).await
    }

    async fn refresh_inline_positions(
        &mut self,
        positions: &[NodePosition],
    ) -> Result<(), HostError> {
        let entries: Vec<PositionEntry> = positions
            .iter()
            .map(|p| PositionEntry {
                id: p.id.clone(),
                x: p.position.x,
                y: p.position.y,
                geo: p.geo_coordinates.map(|g| (g.lat, g.lng)),
            })
            .collect();
        self.doc_store.save_positions(&entries).await?;
        Ok(())
    }

    async fn capture_history(&self) -> Result<HistoryEntry, HostError> {
        let topology_text = self.fs.read_to_string(&self.topo_path).await?;
        let annotations_text = match self.fs.read_to_string(&self.ann_path).await {
            Ok(text) => Some(text),
            Err(FsError::NotFound(_)) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(HistoryEntry {
            topology_text,
            annotations_text,
        })
    }

    async fn undo(&mut self) -> CommandResponse {
        self.merge_deadline = None;
        if !self.history.can_undo() {
            return self.noop_ack().await;
        }
        let current = match self.capture_history().await {
            Ok(entry) => entry,
            Err(err) => {
                return CommandResponse::Error {
                    message: err.to_string(),
                }
            }
        };
        let Some(entry) = self.history.pop_past() else {
            return self.noop_ack().await;
        };
        self.history.push_future(current);

        match self.restore(&entry).await {
            Ok(()) => {
                self.revision += 1;
                self.ack_with_rebuild().await
            }
            Err(err) => {
                // Return both stacks to their pre-attempt state: a failed
                // restore must not consume the undo step.
                self.history.pop_future();
                self.history.push_past(entry);
                self.recover_after_failure().await;
                CommandResponse::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    async fn redo(&mut self) -> CommandResponse {
        self.merge_deadline = None;
        if !self.history.can_redo() {
            return self.noop_ack().await;
        }
        let current = match self.capture_history().await {
            Ok(entry) => entry,
            Err(err) => {
                return CommandResponse::Error {
                    message: err.to_string(),
                }
            }
        };
        let Some(entry) = self.history.pop_future() else {
            return self.noop_ack().await;
        };
        self.history.push_past(current);

        match self.restore(&entry).await {
            Ok(()) => {
                self.revision += 1;
                self.ack_with_rebuild().await
            }
            Err(err) => {
                self.history.pop_past();
                self.history.push_future(entry);
                self.recover_after_failure().await;
                CommandResponse::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Writes both captured files back verbatim inside one transaction
    /// and reloads the stores.
    async fn restore(&mut self, entry: &HistoryEntry) -> Result<(), HostError> {
        self.fs.begin()?;
        self.fs.write(&self.topo_path, &entry.topology_text).await?;
        match &entry.annotations_text {
            Some(text) => self.fs.write(&self.ann_path, text).await?,
            None => {
                if self.fs.exists(&self.ann_path).await {
                    self.fs.unlink(&self.ann_path).await?;
                }
            }
        }
        self.fs.commit().await?;
        self.annotations.clear_cache();
        self.doc_store.initialize_from_file(&self.topo_path).await?;
        Ok(())
    }

    async fn noop_ack(&mut self) -> CommandResponse {
        match self.get_snapshot().await {
            Ok(snapshot) => CommandResponse::Ack {
                revision: self.revision,
                snapshot,
            },
            Err(err) => CommandResponse::Error {
                message: err.to_string(),
            },
        }
    }

    async fn ack_with_rebuild(&mut self) -> CommandResponse {
        match self.rebuild_snapshot().await {
            Ok(snapshot) => CommandResponse::Ack {
                revision: self.revision,
                snapshot,
            },
            Err(err) => CommandResponse::Error {
                message: err.to_string(),
            },
        }
    }

    /// Rebuilds and caches the snapshot.
    ///
    /// Multi-pass: migrations detected during the build are persisted and
    /// the graph rebuilt, so a renderer sees the migrated state in the
    /// same snapshot that triggered it. Migration and reconciliation
    /// failures degrade to a snapshot without them, never an error.
    async fn rebuild_snapshot(&mut self) -> Result<TopologySnapshot, HostError> {
        let text = self.fs.read_to_string(&self.topo_path).await?;
        let doc: TopologyFile = netloom_topo::parse(&text)?;
        let mut ann = self.annotations.load(&self.ann_path, false).await;

        if let Some(rename) = migrate::reconcile_orphans(&doc, &ann) {
            debug!(from = %rename.from, to = %rename.to, "reconciling orphaned annotation");
            match self
                .annotations
                .modify(&self.ann_path, {
                    let rename = rename.clone();
                    move |a| migrate::apply_rename(a, &rename)
                })
                .await
            {
                Ok(fresh) => ann = fresh,
                Err(err) => {
                    warn!(%err, "orphan reconciliation failed; continuing without it");
                }
            }
        }

        let live = self.live.as_deref();
        let mut graph = build_graph(&doc, &ann, self.config.mode, live).await;

        let pending = migrate::detect(&doc, &ann);
        if !pending.is_empty() {
            match self
                .annotations
                .modify(&self.ann_path, {
                    let pending = pending.clone();
                    move |a| migrate::apply(a, &pending)
                })
                .await
            {
                Ok(fresh) => {
                    ann = fresh;
                    graph = build_graph(&doc, &ann, self.config.mode, live).await;
                }
                Err(err) => {
                    warn!(%err, "migration persist failed; snapshot built without it");
                }
            }
        }

        let deploy_state = match &self.live {
            Some(live) => live.lab_state(&doc.name).await,
            None => DeployState::Unknown,
        };
        let snapshot = TopologySnapshot {
            revision: self.revision,
            mode: self.config.mode,
            deploy_state,
            lab_name: doc.name.clone(),
            lab_settings: Some(doc.lab_settings()),
            graph,
            annotations: ann,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// The sidecar path this host derived from its topology path.
    #[must_use]
    pub fn annotations_path(&self) -> &Path {
        &self.ann_path
    }
}

fn fold_positions(doc: &mut AnnotationsDoc, positions: &[NodePosition]) {
    for update in positions {
        let entry = doc.node_annotation_mut(&update.id);
        entry.position = Some(update.position);
        if update.geo_coordinates.is_some() {
            entry.geo_coordinates = update.geo_coordinates;
        }
    }
}

fn apply_memberships(doc: &mut AnnotationsDoc, memberships: &[GroupMembership]) {
    for membership in memberships {
        doc.node_annotation_mut(&membership.node_id).group_id = membership.group_id.clone();
    }
}
