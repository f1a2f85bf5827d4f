// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The topology document store.
//!
//! Owns the editable tree for exactly one document at a time. CRUD
//! operations mutate the tree in place and persist immediately unless a
//! batch is open; the tree is never handed out mutably — lab settings go
//! through the dedicated ordering-aware path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::{Mapping, Value};

use netloom_fs::FsPort;

use crate::model::{labels, LabSettings, LinkDef, NodeDef, TopologyFile};
use crate::tree::{
    child_mapping_mut, child_sequence_mut, insert_ordered, rename_key, shift_remove,
};
use crate::{model, TopoError};

/// Position update for [`TopoDocStore::save_positions`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEntry {
    /// Node id.
    pub id: String,
    /// Canvas X.
    pub x: f64,
    /// Canvas Y.
    pub y: f64,
    /// Optional geographic coordinate (lat, lng).
    pub geo: Option<(f64, f64)>,
}

struct DocState {
    path: PathBuf,
    tree: Value,
}

/// Format-preserving store for the primary topology document.
///
/// # Invariants
/// - The tree root is always a mapping (enforced at initialization).
/// - Every mutation persists before returning, except while a batch is
///   open; `end_batch` performs the single deferred write.
/// - The tree is owned exclusively by this store; callers read through
///   [`TopoDocStore::typed`] or [`TopoDocStore::document`].
pub struct TopoDocStore {
    fs: Arc<dyn FsPort>,
    state: Option<DocState>,
    batch_open: bool,
}

impl TopoDocStore {
    /// Creates an uninitialized store over the given filesystem port.
    #[must_use]
    pub fn new(fs: Arc<dyn FsPort>) -> Self {
        Self {
            fs,
            state: None,
            batch_open: false,
        }
    }

    /// Reads and parses `path`, replacing any previously loaded document.
    ///
    /// # Errors
    /// Propagates read failures and parse errors; the store keeps its
    /// previous document on failure.
    pub async fn initialize_from_file(&mut self, path: &Path) -> Result<(), TopoError> {
        let text = self.fs.read_to_string(path).await?;
        let tree = model::parse_tree(&text)
            .map_err(|err| match err {
                TopoError::NotAMapping(_) => TopoError::NotAMapping(path.to_path_buf()),
                other => other,
            })?;
        // Validate the typed view up front so CRUD paths can assume shape.
        model::typed_view(&tree)?;
        self.state = Some(DocState {
            path: path.to_path_buf(),
            tree,
        });
        self.batch_open = false;
        Ok(())
    }

    /// Reports whether a document is loaded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Read-only access to the editable tree.
    pub fn document(&self) -> Result<&Value, TopoError> {
        self.state
            .as_ref()
            .map(|s| &s.tree)
            .ok_or(TopoError::NotInitialized)
    }

    /// Extracts the typed view of the current tree.
    pub fn typed(&self) -> Result<TopologyFile, TopoError> {
        model::typed_view(self.document()?)
    }

    /// Serializes the current tree back to document text.
    pub fn serialize(&self) -> Result<String, TopoError> {
        Ok(serde_yaml::to_string(self.document()?)?)
    }

    /// Opens a batch: subsequent operations mutate without persisting.
    pub fn begin_batch(&mut self) -> Result<(), TopoError> {
        if self.batch_open {
            return Err(TopoError::BatchActive);
        }
        if self.state.is_none() {
            return Err(TopoError::NotInitialized);
        }
        self.batch_open = true;
        Ok(())
    }

    /// Closes the batch and performs the single deferred write.
    pub async fn end_batch(&mut self) -> Result<(), TopoError> {
        if !self.batch_open {
            return Err(TopoError::NoBatch);
        }
        self.batch_open = false;
        self.persist().await
    }

    /// Adds a node declaration.
    ///
    /// # Errors
    /// Returns [`TopoError::NodeExists`] for a duplicate id.
    pub async fn add_node(&mut self, id: &str, def: &NodeDef) -> Result<(), TopoError> {
        let value = node_value(def)?;
        {
            let nodes = self.nodes_mut()?;
            if nodes.contains_key(id) {
                return Err(TopoError::NodeExists(id.to_owned()));
            }
            nodes.insert(Value::String(id.to_owned()), value);
        }
        self.persist_unless_batched().await
    }

    /// Replaces a node declaration, optionally renaming it.
    ///
    /// A rename keeps the node's position in the document and rewrites
    /// every link endpoint referencing the old id.
    ///
    /// # Errors
    /// Returns [`TopoError::NodeMissing`] when `id` does not exist, and
    /// [`TopoError::NodeExists`] when `rename_to` collides.
    pub async fn edit_node(
        &mut self,
        id: &str,
        rename_to: Option<&str>,
        def: &NodeDef,
    ) -> Result<(), TopoError> {
        let value = node_value(def)?;
        {
            let nodes = self.nodes_mut()?;
            if !nodes.contains_key(id) {
                return Err(TopoError::NodeMissing(id.to_owned()));
            }
        }
        let final_id = match rename_to {
            Some(new_id) if new_id != id => {
                {
                    let nodes = self.nodes_mut()?;
                    if nodes.contains_key(new_id) {
                        return Err(TopoError::NodeExists(new_id.to_owned()));
                    }
                    rename_key(nodes, id, new_id);
                }
                self.rewrite_endpoints(id, new_id)?;
                new_id.to_owned()
            }
            _ => id.to_owned(),
        };
        if let Some(slot) = self.nodes_mut()?.get_mut(final_id.as_str()) {
            *slot = value;
        }
        self.persist_unless_batched().await
    }

    /// Deletes a node declaration and every link referencing it.
    ///
    /// Dropping referencing links (rather than leaving dangling
    /// endpoints) is the documented delete-path behavior.
    pub async fn delete_node(&mut self, id: &str) -> Result<(), TopoError> {
        {
            let nodes = self.nodes_mut()?;
            if shift_remove(nodes, id).is_none() {
                return Err(TopoError::NodeMissing(id.to_owned()));
            }
        }
        {
            let links = self.links_mut()?;
            links.retain(|raw| {
                !serde_yaml::from_value::<LinkDef>(raw.clone())
                    .is_ok_and(|link| link.references(id))
            });
        }
        self.persist_unless_batched().await
    }

    /// Appends a link declaration.
    pub async fn add_link(&mut self, def: &LinkDef) -> Result<(), TopoError> {
        let value = serde_yaml::to_value(def)?;
        self.links_mut()?.push(value);
        self.persist_unless_batched().await
    }

    /// Replaces the link at `index`.
    ///
    /// Links are addressed by document order; indices are stable within a
    /// revision, and every mutating command is revision-checked upstream.
    pub async fn edit_link(&mut self, index: usize, def: &LinkDef) -> Result<(), TopoError> {
        let value = serde_yaml::to_value(def)?;
        {
            let links = self.links_mut()?;
            let slot = links
                .get_mut(index)
                .ok_or_else(|| TopoError::LinkMissing(index))?;
            *slot = value;
        }
        self.persist_unless_batched().await
    }

    /// Removes the link at `index`.
    pub async fn delete_link(&mut self, index: usize) -> Result<(), TopoError> {
        {
            let links = self.links_mut()?;
            if index >= links.len() {
                return Err(TopoError::LinkMissing(index));
            }
            links.remove(index);
        }
        self.persist_unless_batched().await
    }

    /// Refreshes inline `graph-pos*` labels for the listed nodes.
    ///
    /// Only position and geo-coordinate labels are touched, and only on
    /// nodes that still carry inline position labels — nodes already
    /// migrated to the sidecar are left alone so the legacy encoding is
    /// not reintroduced. Unknown ids are skipped.
    pub async fn save_positions(&mut self, entries: &[PositionEntry]) -> Result<(), TopoError> {
        {
            let nodes = self.nodes_mut()?;
            for entry in entries {
                let Some(node) = nodes.get_mut(entry.id.as_str()).and_then(Value::as_mapping_mut)
                else {
                    continue;
                };
                let Some(node_labels) = node.get_mut("labels").and_then(Value::as_mapping_mut)
                else {
                    continue;
                };
                if !node_labels.contains_key(labels::POS_X)
                    && !node_labels.contains_key(labels::POS_Y)
                {
                    continue;
                }
                node_labels.insert(
                    Value::String(labels::POS_X.to_owned()),
                    Value::String(format_coord(entry.x)),
                );
                node_labels.insert(
                    Value::String(labels::POS_Y.to_owned()),
                    Value::String(format_coord(entry.y)),
                );
                if let Some((lat, lng)) = entry.geo {
                    node_labels.insert(
                        Value::String(labels::GEO_LAT.to_owned()),
                        Value::String(format_coord(lat)),
                    );
                    node_labels.insert(
                        Value::String(labels::GEO_LNG.to_owned()),
                        Value::String(format_coord(lng)),
                    );
                }
            }
        }
        self.persist_unless_batched().await
    }

    /// Applies lab-level settings with canonical key ordering: `prefix`
    /// lands immediately after `name`, `mgmt` after `prefix` when present
    /// (after `name` otherwise). `None` clears the corresponding key.
    pub async fn set_lab_settings(&mut self, settings: &LabSettings) -> Result<(), TopoError> {
        {
            let root = self.root_mut()?;
            insert_ordered(
                root,
                "name",
                Value::String(settings.name.clone()),
                &[],
            );
            match &settings.prefix {
                Some(prefix) => insert_ordered(
                    root,
                    "prefix",
                    Value::String(prefix.clone()),
                    &["name"],
                ),
                None => {
                    shift_remove(root, "prefix");
                }
            }
            match &settings.mgmt {
                Some(mgmt) => insert_ordered(
                    root,
                    "mgmt",
                    Value::Mapping(mgmt.clone()),
                    &["prefix", "name"],
                ),
                None => {
                    shift_remove(root, "mgmt");
                }
            }
        }
        self.persist_unless_batched().await
    }

    async fn persist_unless_batched(&mut self) -> Result<(), TopoError> {
        if self.batch_open {
            return Ok(());
        }
        self.persist().await
    }

    async fn persist(&mut self) -> Result<(), TopoError> {
        let state = self.state.as_ref().ok_or(TopoError::NotInitialized)?;
        let text = serde_yaml::to_string(&state.tree)?;
        self.fs.write(&state.path, &text).await?;
        Ok(())
    }

    fn root_mut(&mut self) -> Result<&mut Mapping, TopoError> {
        self.state
            .as_mut()
            .ok_or(TopoError::NotInitialized)?
            .tree
            .as_mapping_mut()
            .ok_or_else(|| TopoError::NotAMapping(PathBuf::new()))
    }

    fn nodes_mut(&mut self) -> Result<&mut Mapping, TopoError> {
        let root = self.root_mut()?;
        let topology = child_mapping_mut(root, "topology");
        Ok(child_mapping_mut(topology, "nodes"))
    }

    fn links_mut(&mut self) -> Result<&mut Vec<Value>, TopoError> {
        let root = self.root_mut()?;
        let topology = child_mapping_mut(root, "topology");
        Ok(child_sequence_mut(topology, "links"))
    }

    /// Rewrites `old:iface` endpoints to `new:iface` across all links.
    fn rewrite_endpoints(&mut self, old_id: &str, new_id: &str) -> Result<(), TopoError> {
        let links = self.links_mut()?;
        for raw in &mut *links {
            rewrite_link_endpoints(raw, old_id, new_id);
        }
        Ok(())
    }
}

fn node_value(def: &NodeDef) -> Result<Value, TopoError> {
    let value = serde_yaml::to_value(def)?;
    // A fully-empty declaration serializes as an empty mapping, not null.
    if value.is_null() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    Ok(value)
}

fn format_coord(v: f64) -> String {
    // Inline labels historically store coordinates as strings; keep
    // integral values free of a trailing `.0`.
    if (v - v.trunc()).abs() < f64::EPSILON {
        #[allow(clippy::cast_possible_truncation)]
        let whole = v.trunc() as i64;
        format!("{whole}")
    } else {
        format!("{v}")
    }
}

fn rewrite_link_endpoints(raw: &mut Value, old_id: &str, new_id: &str) {
    let Some(map) = raw.as_mapping_mut() else {
        return;
    };
    if let Some(endpoints) = map.get_mut("endpoints").and_then(Value::as_sequence_mut) {
        for ep in &mut *endpoints {
            rewrite_endpoint(ep, old_id, new_id);
        }
    }
    if let Some(ep) = map.get_mut("endpoint") {
        rewrite_endpoint(ep, old_id, new_id);
    }
}

fn rewrite_endpoint(ep: &mut Value, old_id: &str, new_id: &str) {
    let Some(text) = ep.as_str() else {
        return;
    };
    let (node, iface) = model::split_endpoint(text);
    if node != old_id {
        return;
    }
    let rewritten = match iface {
        Some(iface) => format!("{new_id}:{iface}"),
        None => new_id.to_owned(),
    };
    *ep = Value::String(rewritten);
}
