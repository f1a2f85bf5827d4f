// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed read view of the topology document.
//!
//! The typed view is extracted from the editable tree and never mutated;
//! all writes go through [`crate::TopoDocStore`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::TopoError;

/// Legacy inline label keys carrying visual metadata inside node
/// declarations. Migrated into the annotations sidecar on read.
pub mod labels {
    /// Canvas X position.
    pub const POS_X: &str = "graph-posX";
    /// Canvas Y position.
    pub const POS_Y: &str = "graph-posY";
    /// Icon name.
    pub const ICON: &str = "graph-icon";
    /// Hierarchy level.
    pub const LEVEL: &str = "graph-level";
    /// Group box name.
    pub const GROUP: &str = "graph-group";
    /// Label placement.
    pub const LABEL_POS: &str = "graph-labelPos";
    /// Geographic latitude.
    pub const GEO_LAT: &str = "graph-geoCoordinateLat";
    /// Geographic longitude.
    pub const GEO_LNG: &str = "graph-geoCoordinateLng";
}

/// A node declaration.
///
/// Fields the editor does not model are captured in `extra` and written
/// back untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeDef {
    /// Platform kind, e.g. `nokia_srlinux`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Container image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Hardware type/variant string.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Display group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Freeform string→scalar labels (includes legacy `graph-*` keys).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, Value>,
    /// Declaration fields outside the editor's model, preserved verbatim.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl NodeDef {
    /// Returns the label value for `key` as text, when present and scalar.
    #[must_use]
    pub fn label_str(&self, key: &str) -> Option<String> {
        match self.labels.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns the label value for `key` parsed as a float.
    #[must_use]
    pub fn label_f64(&self, key: &str) -> Option<f64> {
        match self.labels.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reports whether any legacy `graph-*` position label is present.
    #[must_use]
    pub fn has_inline_position(&self) -> bool {
        self.labels.contains_key(labels::POS_X) || self.labels.contains_key(labels::POS_Y)
    }
}

/// A link declaration: point-to-point between two node endpoints, or a
/// special single-endpoint link to an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkDef {
    /// Two-endpoint link, each endpoint `node:interface`.
    PointToPoint {
        /// Exactly two `node:interface` endpoints.
        endpoints: Vec<String>,
    },
    /// Single-endpoint link to an external resource (`host`, `mgmt-net`,
    /// `macvlan`, `dummy`, …).
    Special {
        /// External resource type.
        #[serde(rename = "type")]
        kind: String,
        /// The node-side endpoint, `node:interface`.
        endpoint: String,
        /// Host-side interface for `host`/`macvlan` links.
        #[serde(
            default,
            rename = "host-interface",
            skip_serializing_if = "Option::is_none"
        )]
        host_interface: Option<String>,
    },
}

impl LinkDef {
    /// All `node:interface` endpoints this link references.
    #[must_use]
    pub fn endpoints(&self) -> Vec<&str> {
        match self {
            Self::PointToPoint { endpoints } => endpoints.iter().map(String::as_str).collect(),
            Self::Special { endpoint, .. } => vec![endpoint.as_str()],
        }
    }

    /// Reports whether any endpoint references node `id`.
    #[must_use]
    pub fn references(&self, id: &str) -> bool {
        self.endpoints()
            .iter()
            .any(|ep| split_endpoint(ep).0 == id)
    }
}

/// Default interface-naming pattern for well-known node kinds.
///
/// Renders historically inferred patterns from this table; the inference
/// is persisted into the node's annotation entry the first time it is
/// observed, so future renders no longer depend on it.
#[must_use]
pub fn default_interface_pattern(kind: &str) -> Option<&'static str> {
    match kind {
        "nokia_srlinux" | "nokia_sros" => Some("e1-{n}"),
        "arista_ceos" | "arista_veos" | "juniper_crpd" | "linux" | "bridge" | "ovs-bridge" => {
            Some("eth{n}")
        }
        "cisco_xrd" => Some("Gi0-0-0-{n}"),
        _ => None,
    }
}

/// Splits `node:interface` into its parts; the interface may be absent.
#[must_use]
pub fn split_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once(':') {
        Some((node, iface)) => (node, Some(iface)),
        None => (endpoint, None),
    }
}

/// The topology body: declared nodes and links.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Node declarations, in document order.
    #[serde(default)]
    pub nodes: IndexMap<String, NodeDef>,
    /// Link declarations, in document order.
    #[serde(default)]
    pub links: Vec<LinkDef>,
}

/// Lab-level settings block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSettings {
    /// Lab name.
    pub name: String,
    /// Optional node-name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Optional management-network block, preserved opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt: Option<Mapping>,
}

/// Typed read view of a parsed topology document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopologyFile {
    /// Lab name.
    pub name: String,
    /// Optional node-name prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional management-network block.
    #[serde(default)]
    pub mgmt: Option<Mapping>,
    /// The topology body.
    #[serde(default)]
    pub topology: Topology,
}

impl TopologyFile {
    /// The lab-level settings carried by this document.
    #[must_use]
    pub fn lab_settings(&self) -> LabSettings {
        LabSettings {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            mgmt: self.mgmt.clone(),
        }
    }
}

/// Parses document text into the editable tree.
///
/// # Errors
/// Returns [`TopoError::Parse`] on malformed YAML and
/// [`TopoError::NotAMapping`] when the root is not a mapping.
pub fn parse_tree(text: &str) -> Result<Value, TopoError> {
    let value: Value = serde_yaml::from_str(text)?;
    if value.as_mapping().is_none() {
        return Err(TopoError::NotAMapping(std::path::PathBuf::new()));
    }
    Ok(value)
}

/// Extracts the typed view from an editable tree.
pub fn typed_view(tree: &Value) -> Result<TopologyFile, TopoError> {
    Ok(serde_yaml::from_value(tree.clone())?)
}

/// Parses document text straight into the typed view.
pub fn parse(text: &str) -> Result<TopologyFile, TopoError> {
    Ok(serde_yaml::from_str(text)?)
}
