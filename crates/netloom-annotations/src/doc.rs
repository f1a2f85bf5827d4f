// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Annotation document types. Plain serde data, camelCase on disk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canvas position in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Geographic position for map layouts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoCoordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// Width/height pair for shape overlays.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in layout units.
    pub width: f64,
    /// Height in layout units.
    pub height: f64,
}

/// Free-text overlay drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextAnnotation {
    /// Stable overlay identifier.
    pub id: String,
    /// Text content.
    pub text: String,
    /// Anchor position.
    pub position: Position,
    /// Font size override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Font color override (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    /// Background color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

/// Shape classification for free-shape overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle.
    Rectangle,
    /// Ellipse inscribed in the bounding box.
    Ellipse,
    /// Straight line from `position` to `position + size`.
    Line,
}

/// Free-shape overlay drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeShapeAnnotation {
    /// Stable overlay identifier.
    pub id: String,
    /// Shape classification.
    pub kind: ShapeKind,
    /// Top-left anchor position.
    pub position: Position,
    /// Bounding box extent.
    pub size: Size,
    /// Stroke color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    /// Fill color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    /// Rotation in degrees around the shape center.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

/// Style record for a node group/box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStyleAnnotation {
    /// Group identifier (matches node `group_id` memberships).
    pub id: String,
    /// Display label for the box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Background color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Border color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    /// Border style (`solid`, `dashed`, `dotted`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_style: Option<String>,
}

/// Per-node visual metadata, keyed by topology node id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAnnotation {
    /// Topology node id this annotation belongs to.
    pub id: String,
    /// Canvas position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Geographic position for map layouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_coordinates: Option<GeoCoordinates>,
    /// Icon name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Hierarchy level for layered layouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    /// Label placement (`top`, `bottom`, `left`, `right`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_position: Option<String>,
    /// Group box this node belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Interface-naming pattern, e.g. `e1-{n}` or `eth{n}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_pattern: Option<String>,
}

impl NodeAnnotation {
    /// Creates an empty annotation for `id`.
    #[must_use]
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Position/label for non-node graph elements (bridges, host interfaces)
/// synthesized from special links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkNodeAnnotation {
    /// Synthetic endpoint id, e.g. `host:eth0` or `mgmt-net`.
    pub id: String,
    /// Canvas position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Display label override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Per-edge visual metadata, keyed by the resolved edge id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAnnotation {
    /// Resolved edge id (`source:ep--target:ep`).
    pub id: String,
    /// Line style (`solid`, `dashed`, `dotted`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Stroke color (CSS color).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Mid-edge label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Viewer-wide settings persisted alongside the annotations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSettings {
    /// Zoom factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Pan offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<Position>,
    /// Layout engine name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    /// Whether the background grid is shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_grid: Option<bool>,
}

/// The sidecar annotations document.
///
/// Every collection is defaulted on deserialization, so a loaded document
/// is always fully normalized. Deprecated fields from earlier schema
/// revisions are accepted on read and stripped on write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsDoc {
    /// Free-text overlays.
    #[serde(default)]
    pub free_text_annotations: Vec<FreeTextAnnotation>,
    /// Free-shape overlays.
    #[serde(default)]
    pub free_shape_annotations: Vec<FreeShapeAnnotation>,
    /// Group/box style records.
    #[serde(default)]
    pub group_style_annotations: Vec<GroupStyleAnnotation>,
    /// Per-node annotations.
    #[serde(default)]
    pub node_annotations: Vec<NodeAnnotation>,
    /// Per-network-endpoint annotations.
    #[serde(default)]
    pub network_node_annotations: Vec<NetworkNodeAnnotation>,
    /// Per-edge annotations.
    #[serde(default)]
    pub edge_annotations: Vec<EdgeAnnotation>,
    /// Viewer-wide settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_settings: Option<ViewerSettings>,
    /// Deprecated flat position map from the v0 sidecar schema. Folded
    /// into `node_annotations` by [`AnnotationsDoc::normalize`]; never
    /// written back.
    #[serde(default, rename = "positions", skip_serializing)]
    pub legacy_positions: HashMap<String, Position>,
}

impl AnnotationsDoc {
    /// Folds deprecated fields into the current schema.
    ///
    /// Idempotent; a legacy position is dropped when the node already has
    /// an annotation entry.
    pub fn normalize(&mut self) {
        if self.legacy_positions.is_empty() {
            return;
        }
        let mut ids: Vec<&String> = self.legacy_positions.keys().collect();
        ids.sort();
        let mut adopted = Vec::new();
        for id in ids {
            if self.node_annotation(id).is_none() {
                let mut ann = NodeAnnotation::for_id(id.clone());
                ann.position = self.legacy_positions.get(id).copied();
                adopted.push(ann);
            }
        }
        self.node_annotations.extend(adopted);
        self.legacy_positions.clear();
    }

    /// Returns the annotation entry for node `id`, if present.
    #[must_use]
    pub fn node_annotation(&self, id: &str) -> Option<&NodeAnnotation> {
        self.node_annotations.iter().find(|a| a.id == id)
    }

    /// Returns the annotation entry for node `id`, creating an empty one
    /// when absent.
    pub fn node_annotation_mut(&mut self, id: &str) -> &mut NodeAnnotation {
        if let Some(idx) = self.node_annotations.iter().position(|a| a.id == id) {
            return &mut self.node_annotations[idx];
        }
        self.node_annotations.push(NodeAnnotation::for_id(id));
        let last = self.node_annotations.len() - 1;
        &mut self.node_annotations[last]
    }
}
