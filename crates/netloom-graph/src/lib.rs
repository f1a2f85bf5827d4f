// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Resolved renderable topology graph for Netloom.
//!
//! Pure data plus one resolution pass: [`build_graph`] folds the typed
//! topology document and its annotations into nodes/edges a renderer can
//! draw directly, optionally enriched with live runtime status in `view`
//! mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use netloom_annotations::{AnnotationsDoc, GeoCoordinates, Position};
use netloom_topo::{
    default_interface_pattern, labels, split_endpoint, LinkDef, NodeDef, TopologyFile,
};

/// Operating mode of a host instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphMode {
    /// Authoring mode: structural editing, no live enrichment.
    Edit,
    /// Inspection mode: read-only, enriched with runtime status.
    View,
}

/// Deployment state of the lab behind a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeployState {
    /// The lab's workloads are running.
    Deployed,
    /// The lab is defined but not running.
    Undeployed,
    /// No live-status provider, or the provider could not tell.
    Unknown,
}

/// Runtime status for a deployed node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRuntime {
    /// Process/container state, e.g. `running`.
    pub state: String,
    /// Management IPv4 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv4: Option<String>,
    /// Management IPv6 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ipv6: Option<String>,
}

/// Runtime status for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfaceRuntime {
    /// Operational state, e.g. `up`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oper_state: Option<String>,
    /// Received byte counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_bytes: Option<u64>,
    /// Transmitted byte counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_bytes: Option<u64>,
}

/// Live runtime status provider, queried by name during snapshot builds.
///
/// Purely an enrichment source: every method is allowed to come back
/// empty and the graph builds without it.
#[async_trait]
pub trait LiveStatusPort: Send + Sync {
    /// Deployment state of the named lab.
    async fn lab_state(&self, lab: &str) -> DeployState;

    /// Runtime status of one node, when deployed.
    async fn node_runtime(&self, lab: &str, node: &str) -> Option<NodeRuntime>;

    /// Runtime status of one interface, when deployed.
    async fn interface_runtime(&self, lab: &str, node: &str, iface: &str) -> Option<IfaceRuntime>;
}

/// A resolved, renderable node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Node id (topology id, or synthetic endpoint id).
    pub id: String,
    /// Platform kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Container image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Hardware type/variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Display group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Group box membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Canvas position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Geographic position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_coordinates: Option<GeoCoordinates>,
    /// Icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Hierarchy level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    /// Label placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_position: Option<String>,
    /// Interface-naming pattern in effect for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_pattern: Option<String>,
    /// True for synthetic endpoints of special links (`host:eth0`, …).
    #[serde(default)]
    pub network_endpoint: bool,
    /// Live runtime status (`view` mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<NodeRuntime>,
}

/// Interface runtime attached to an edge's two sides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRuntime {
    /// Source-side interface status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<IfaceRuntime>,
    /// Target-side interface status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<IfaceRuntime>,
}

/// A resolved, renderable edge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Stable edge id, `sourceEp--targetEp`.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Source interface name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,
    /// Target node id.
    pub target: String,
    /// Target interface name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_endpoint: Option<String>,
    /// Line style from edge annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Stroke color from edge annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Mid-edge label from edge annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Live interface status (`view` mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<EdgeRuntime>,
}

/// The resolved graph carried by every snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopoGraph {
    /// All renderable nodes, topology nodes first, then synthetic
    /// endpoints in order of first reference.
    pub nodes: Vec<GraphNode>,
    /// All renderable edges, in link declaration order.
    pub edges: Vec<GraphEdge>,
}

impl TopoGraph {
    /// Returns the node with the given id, if present.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Folds document + annotations into a renderable graph.
///
/// Annotation values win over legacy inline labels; inline labels are
/// still honored so pre-migration documents render correctly on first
/// load. In `view` mode, nodes and edges are enriched through the
/// live-status port when one is supplied.
pub async fn build_graph(
    doc: &TopologyFile,
    ann: &AnnotationsDoc,
    mode: GraphMode,
    live: Option<&dyn LiveStatusPort>,
) -> TopoGraph {
    let mut graph = TopoGraph::default();

    for (id, def) in &doc.topology.nodes {
        graph.nodes.push(resolve_node(id, def, ann));
    }

    for link in &doc.topology.links {
        let Some(edge) = resolve_edge(link, ann) else {
            continue;
        };
        ensure_synthetic_endpoints(&mut graph, &edge, doc, ann);
        graph.edges.push(edge);
    }

    if mode == GraphMode::View {
        if let Some(live) = live {
            enrich(&mut graph, &doc.name, live).await;
        }
    }

    graph
}

#[allow(clippy::cast_possible_truncation)]
fn resolve_node(id: &str, def: &NodeDef, ann: &AnnotationsDoc) -> GraphNode {
    let entry = ann.node_annotation(id);

    let position = entry
        .and_then(|a| a.position)
        .or_else(|| inline_position(def));
    let geo = entry
        .and_then(|a| a.geo_coordinates)
        .or_else(|| inline_geo(def));
    let icon = entry
        .and_then(|a| a.icon.clone())
        .or_else(|| def.label_str(labels::ICON));
    let level = entry
        .and_then(|a| a.level)
        .or_else(|| def.label_f64(labels::LEVEL).map(|v| v as i64));
    let label_position = entry
        .and_then(|a| a.label_position.clone())
        .or_else(|| def.label_str(labels::LABEL_POS));
    let group = def
        .group
        .clone()
        .or_else(|| def.label_str(labels::GROUP));
    let interface_pattern = entry
        .and_then(|a| a.interface_pattern.clone())
        .or_else(|| {
            def.kind
                .as_deref()
                .and_then(default_interface_pattern)
                .map(str::to_owned)
        });

    GraphNode {
        id: id.to_owned(),
        kind: def.kind.clone(),
        image: def.image.clone(),
        type_name: def.type_name.clone(),
        group,
        group_id: entry.and_then(|a| a.group_id.clone()),
        position,
        geo_coordinates: geo,
        icon,
        level,
        label_position,
        interface_pattern,
        network_endpoint: false,
        runtime: None,
    }
}

fn inline_position(def: &NodeDef) -> Option<Position> {
    let x = def.label_f64(labels::POS_X)?;
    let y = def.label_f64(labels::POS_Y)?;
    Some(Position { x, y })
}

fn inline_geo(def: &NodeDef) -> Option<GeoCoordinates> {
    let lat = def.label_f64(labels::GEO_LAT)?;
    let lng = def.label_f64(labels::GEO_LNG)?;
    Some(GeoCoordinates { lat, lng })
}

fn resolve_edge(link: &LinkDef, ann: &AnnotationsDoc) -> Option<GraphEdge> {
    let (source_ep, target_ep) = match link {
        LinkDef::PointToPoint { endpoints } => {
            let mut it = endpoints.iter();
            let a = it.next()?.clone();
            let b = it.next()?.clone();
            (a, b)
        }
        LinkDef::Special {
            kind,
            endpoint,
            host_interface,
        } => (endpoint.clone(), synthetic_id(kind, host_interface.as_deref())),
    };

    let (source, source_iface) = split_endpoint(&source_ep);
    let (target, target_iface) = split_endpoint(&target_ep);
    let id = format!("{source_ep}--{target_ep}");
    let styled = ann.edge_annotations.iter().find(|e| e.id == id);

    Some(GraphEdge {
        id,
        source: source.to_owned(),
        source_endpoint: source_iface.map(str::to_owned),
        target: target.to_owned(),
        target_endpoint: target_iface.map(str::to_owned),
        style: styled.and_then(|e| e.style.clone()),
        color: styled.and_then(|e| e.color.clone()),
        label: styled.and_then(|e| e.label.clone()),
        runtime: None,
    })
}

/// Synthetic endpoint id for a special link: the resource type, extended
/// with the host-side interface when one is declared.
fn synthetic_id(kind: &str, host_interface: Option<&str>) -> String {
    match host_interface {
        Some(iface) => format!("{kind}:{iface}"),
        None => kind.to_owned(),
    }
}

fn ensure_synthetic_endpoints(
    graph: &mut TopoGraph,
    edge: &GraphEdge,
    doc: &TopologyFile,
    ann: &AnnotationsDoc,
) {
    for end in [&edge.source, &edge.target] {
        if doc.topology.nodes.contains_key(end.as_str()) || graph.node(end).is_some() {
            continue;
        }
        let entry = ann
            .network_node_annotations
            .iter()
            .find(|n| &n.id == end);
        graph.nodes.push(GraphNode {
            id: end.clone(),
            position: entry.and_then(|n| n.position),
            icon: Some("network".to_owned()),
            network_endpoint: true,
            ..GraphNode::default()
        });
    }
}

async fn enrich(graph: &mut TopoGraph, lab: &str, live: &dyn LiveStatusPort) {
    for node in &mut graph.nodes {
        if node.network_endpoint {
            continue;
        }
        node.runtime = live.node_runtime(lab, &node.id).await;
    }
    for edge in &mut graph.edges {
        let source = match &edge.source_endpoint {
            Some(iface) => live.interface_runtime(lab, &edge.source, iface).await,
            None => None,
        };
        let target = match &edge.target_endpoint {
            Some(iface) => live.interface_runtime(lab, &edge.target, iface).await,
            None => None,
        };
        if source.is_some() || target.is_some() {
            edge.runtime = Some(EdgeRuntime { source, target });
        }
    }
}
