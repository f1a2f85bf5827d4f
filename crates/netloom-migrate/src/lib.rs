// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Migration-on-read for legacy topology encodings.
//!
//! Two pure, idempotent transformations upgrade older on-disk forms into
//! the current annotation schema, plus a heuristic that re-associates
//! annotation entries with renamed nodes. All three are decision
//! functions: they compute what should change and the host persists it,
//! so a failed persist can never leave half-applied state behind.

use netloom_annotations::{AnnotationsDoc, GeoCoordinates, NodeAnnotation, Position};
use netloom_topo::{default_interface_pattern, labels, TopologyFile};

/// Changes a snapshot build must persist before the graph is final.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingMigrations {
    /// Annotation entries synthesized from legacy inline `graph-*` labels.
    pub inline: Vec<NodeAnnotation>,
    /// `(node id, pattern)` pairs inferred from node kinds.
    pub patterns: Vec<(String, String)>,
}

impl PendingMigrations {
    /// Reports whether there is nothing to persist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.patterns.is_empty()
    }
}

/// Detects every pending migration for `doc` against `ann`.
///
/// Idempotent: once the result has been applied and persisted, a second
/// detection over the same document returns an empty set.
#[must_use]
pub fn detect(doc: &TopologyFile, ann: &AnnotationsDoc) -> PendingMigrations {
    PendingMigrations {
        inline: extract_inline_annotations(doc, ann),
        patterns: infer_interface_patterns(doc, ann),
    }
}

/// Applies a detected migration set to an annotations document.
///
/// Safe to call against a fresher document than the one `pending` was
/// detected from: entries that appeared in the meantime are not
/// overwritten.
pub fn apply(ann: &mut AnnotationsDoc, pending: &PendingMigrations) {
    for entry in &pending.inline {
        if ann.node_annotation(&entry.id).is_none() {
            ann.node_annotations.push(entry.clone());
        }
    }
    for (id, pattern) in &pending.patterns {
        let entry = ann.node_annotation_mut(id);
        if entry.interface_pattern.is_none() {
            entry.interface_pattern = Some(pattern.clone());
        }
    }
}

/// Synthesizes annotation entries from legacy inline visual labels.
///
/// A node qualifies when it carries at least one `graph-*` label and has
/// no annotation entry yet; existing entries are never overwritten.
#[must_use]
pub fn extract_inline_annotations(doc: &TopologyFile, ann: &AnnotationsDoc) -> Vec<NodeAnnotation> {
    let mut out = Vec::new();
    for (id, def) in &doc.topology.nodes {
        if ann.node_annotation(id).is_some() {
            continue;
        }
        let position = match (def.label_f64(labels::POS_X), def.label_f64(labels::POS_Y)) {
            (Some(x), Some(y)) => Some(Position { x, y }),
            _ => None,
        };
        let geo = match (def.label_f64(labels::GEO_LAT), def.label_f64(labels::GEO_LNG)) {
            (Some(lat), Some(lng)) => Some(GeoCoordinates { lat, lng }),
            _ => None,
        };
        let icon = def.label_str(labels::ICON);
        let level = def.label_f64(labels::LEVEL).map(as_level);
        let label_position = def.label_str(labels::LABEL_POS);
        let group_id = def.label_str(labels::GROUP);

        if position.is_none()
            && geo.is_none()
            && icon.is_none()
            && level.is_none()
            && label_position.is_none()
            && group_id.is_none()
        {
            continue;
        }
        let mut entry = NodeAnnotation::for_id(id.clone());
        entry.position = position;
        entry.geo_coordinates = geo;
        entry.icon = icon;
        entry.level = level;
        entry.label_position = label_position;
        entry.group_id = group_id;
        out.push(entry);
    }
    out
}

#[allow(clippy::cast_possible_truncation)]
fn as_level(v: f64) -> i64 {
    v.trunc() as i64
}

/// Infers interface-naming patterns from node kinds.
///
/// Historically the pattern was looked up from the kind table on every
/// render; persisting it into the annotation entry makes the document
/// self-describing. Nodes already carrying an explicit pattern are
/// skipped.
#[must_use]
pub fn infer_interface_patterns(doc: &TopologyFile, ann: &AnnotationsDoc) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (id, def) in &doc.topology.nodes {
        if ann
            .node_annotation(id)
            .is_some_and(|a| a.interface_pattern.is_some())
        {
            continue;
        }
        let Some(pattern) = def.kind.as_deref().and_then(default_interface_pattern) else {
            continue;
        };
        out.push((id.clone(), pattern.to_owned()));
    }
    out
}

/// A single annotation-id rewrite decided by orphan reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRename {
    /// Orphaned annotation id to rewrite.
    pub from: String,
    /// The node id it should now reference.
    pub to: String,
}

/// Detects a single node rename from orphaned annotations.
///
/// Fires only when exactly one node id has no annotation entry and at
/// least one annotation id references no live node: the classic signature
/// of one rename. Orphans sharing the missing id's alphabetic prefix are
/// preferred; otherwise the first orphan in document order is taken.
/// Ambiguous multi-rename batches are intentionally left unreconciled.
#[must_use]
pub fn reconcile_orphans(doc: &TopologyFile, ann: &AnnotationsDoc) -> Option<OrphanRename> {
    let missing: Vec<&str> = doc
        .topology
        .nodes
        .keys()
        .filter(|id| ann.node_annotation(id).is_none())
        .map(String::as_str)
        .collect();
    let [missing_id] = missing[..] else {
        return None;
    };

    let orphans: Vec<&str> = ann
        .node_annotations
        .iter()
        .filter(|a| !doc.topology.nodes.contains_key(a.id.as_str()))
        .map(|a| a.id.as_str())
        .collect();
    if orphans.is_empty() {
        return None;
    }

    let wanted_prefix = alpha_prefix(missing_id);
    let chosen = orphans
        .iter()
        .find(|o| !wanted_prefix.is_empty() && alpha_prefix(o) == wanted_prefix)
        .copied()
        .unwrap_or(orphans[0]);

    Some(OrphanRename {
        from: chosen.to_owned(),
        to: missing_id.to_owned(),
    })
}

/// Rewrites the reconciled annotation id in place.
pub fn apply_rename(ann: &mut AnnotationsDoc, rename: &OrphanRename) {
    for entry in &mut ann.node_annotations {
        if entry.id == rename.from {
            entry.id = rename.to.clone();
            return;
        }
    }
}

fn alpha_prefix(id: &str) -> &str {
    let end = id
        .char_indices()
        .find(|(_, c)| !c.is_alphabetic())
        .map_or(id.len(), |(idx, _)| idx);
    &id[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> TopologyFile {
        let parsed = netloom_topo::parse(text);
        assert!(parsed.is_ok(), "fixture must parse: {parsed:?}");
        parsed.unwrap_or_else(|_| TopologyFile {
            name: String::new(),
            prefix: None,
            mgmt: None,
            topology: netloom_topo::Topology::default(),
        })
    }

    const LEGACY: &str = "\
name: corelab
topology:
  nodes:
    r1:
      kind: nokia_srlinux
      labels:
        graph-posX: \"100\"
        graph-posY: \"220\"
        graph-icon: router
        graph-level: \"2\"
    plain:
      kind: manual_kind
";

    #[test]
    fn inline_labels_become_annotation_entries() {
        let doc = doc(LEGACY);
        let ann = AnnotationsDoc::default();
        let pending = detect(&doc, &ann);

        assert_eq!(pending.inline.len(), 1, "only r1 carries inline labels");
        let entry = &pending.inline[0];
        assert_eq!(entry.id, "r1");
        assert_eq!(entry.position, Some(Position { x: 100.0, y: 220.0 }));
        assert_eq!(entry.icon.as_deref(), Some("router"));
        assert_eq!(entry.level, Some(2));
    }

    #[test]
    fn migration_is_idempotent_once_persisted() {
        let doc = doc(LEGACY);
        let mut ann = AnnotationsDoc::default();
        let first = detect(&doc, &ann);
        assert!(!first.is_empty());
        apply(&mut ann, &first);

        let second = detect(&doc, &ann);
        assert!(second.is_empty(), "second run must be a no-op: {second:?}");
    }

    #[test]
    fn existing_entries_are_never_overwritten() {
        let doc = doc(LEGACY);
        let mut ann = AnnotationsDoc::default();
        ann.node_annotation_mut("r1").position = Some(Position { x: 1.0, y: 2.0 });

        let pending = detect(&doc, &ann);
        assert!(pending.inline.is_empty());
        apply(&mut ann, &pending);
        assert_eq!(
            ann.node_annotation("r1").and_then(|a| a.position),
            Some(Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn patterns_are_inferred_only_where_absent() {
        let doc = doc(LEGACY);
        let mut ann = AnnotationsDoc::default();
        ann.node_annotation_mut("r1").interface_pattern = Some("custom-{n}".into());

        let pending = detect(&doc, &ann);
        // r1 already has a pattern; `plain` has an unknown kind.
        assert!(pending.patterns.is_empty());

        ann.node_annotation_mut("r1").interface_pattern = None;
        let pending = detect(&doc, &ann);
        assert_eq!(pending.patterns, [("r1".to_owned(), "e1-{n}".to_owned())]);
    }

    #[test]
    fn reconciliation_prefers_the_shared_alphabetic_prefix() {
        // Nodes {a1, a2, b1}; annotations {a1, a3, b1}: a2 is new, a3 is
        // orphaned. The rename must pick a3 for a2, not touch b1's slot.
        let doc = doc("\
name: lab
topology:
  nodes:
    a1: {}
    a2: {}
    b1: {}
");
        let mut ann = AnnotationsDoc::default();
        for id in ["a1", "a3", "b1"] {
            let _ = ann.node_annotation_mut(id);
        }

        let rename = reconcile_orphans(&doc, &ann);
        assert_eq!(
            rename,
            Some(OrphanRename {
                from: "a3".into(),
                to: "a2".into()
            })
        );
        let Some(rename) = rename else { return };
        apply_rename(&mut ann, &rename);
        assert!(ann.node_annotation("a2").is_some());
        assert!(ann.node_annotation("a3").is_none());
    }

    #[test]
    fn reconciliation_falls_back_to_the_first_orphan() {
        let doc = doc("\
name: lab
topology:
  nodes:
    x9: {}
");
        let mut ann = AnnotationsDoc::default();
        for id in ["zz1", "zz2"] {
            let _ = ann.node_annotation_mut(id);
        }
        let rename = reconcile_orphans(&doc, &ann);
        assert_eq!(
            rename,
            Some(OrphanRename {
                from: "zz1".into(),
                to: "x9".into()
            })
        );
    }

    #[test]
    fn multi_rename_batches_are_left_alone() {
        let doc = doc("\
name: lab
topology:
  nodes:
    a1: {}
    a2: {}
");
        let mut ann = AnnotationsDoc::default();
        for id in ["old1", "old2"] {
            let _ = ann.node_annotation_mut(id);
        }
        // Two missing ids: ambiguous, no reconciliation.
        assert_eq!(reconcile_orphans(&doc, &ann), None);
    }

    #[test]
    fn no_orphans_means_no_rename() {
        let doc = doc("\
name: lab
topology:
  nodes:
    a1: {}
    a2: {}
");
        let mut ann = AnnotationsDoc::default();
        let _ = ann.node_annotation_mut("a1");
        // a2 is missing but nothing is orphaned (a fresh add, not a rename).
        assert_eq!(reconcile_orphans(&doc, &ann), None);
    }
}
