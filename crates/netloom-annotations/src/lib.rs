// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sidecar annotations document for Netloom topologies.
//!
//! Annotations carry everything visual that does not belong in the
//! topology file itself: node positions and icons, free-text and shape
//! overlays, group styling, edge styling, and viewer-wide settings. The
//! sidecar is optional decoration — absence and malformed content both
//! read as an empty document, never an error.

mod doc;
mod store;

pub use doc::{
    AnnotationsDoc, EdgeAnnotation, FreeShapeAnnotation, FreeTextAnnotation, GeoCoordinates,
    GroupStyleAnnotation, NetworkNodeAnnotation, NodeAnnotation, Position, ShapeKind, Size,
    ViewerSettings,
};
pub use store::{annotations_path, AnnotationsError, AnnotationsStore};
