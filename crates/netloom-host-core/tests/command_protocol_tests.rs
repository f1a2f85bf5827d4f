// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Revision discipline, stale rejection, and transactional atomicity.
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use common::{ack_revision, disk_state, host_with, plain_host, request, ANN_PATH, TOPO_PATH};
use netloom_host_core::HostConfig;
use netloom_session_proto::{
    Command, CommandResponse, NodeDef, NodePosition, Position, RejectReason,
};
use std::path::Path;

fn add_node(id: &str) -> Command {
    Command::AddNode {
        id: id.into(),
        node: NodeDef {
            kind: Some("manual_kind".into()),
            ..NodeDef::default()
        },
    }
}

#[tokio::test]
async fn get_snapshot_never_changes_the_revision() {
    let (_mem, mut host) = plain_host();
    let first = host.get_snapshot().await.expect("snapshot builds");
    let second = host.get_snapshot().await.expect("snapshot builds");
    assert_eq!(first.revision, 1);
    assert_eq!(second.revision, 1);
    assert_eq!(host.revision(), 1);
}

#[tokio::test]
async fn successful_commands_increment_by_exactly_one() {
    let (_mem, mut host) = plain_host();
    let mut revision = host.get_snapshot().await.expect("snapshot builds").revision;

    for id in ["r3", "r4", "r5"] {
        let response = host.apply(request(revision, add_node(id))).await;
        let next = ack_revision(&response);
        assert_eq!(next, revision + 1, "revision must step by exactly 1");
        revision = next;
    }
}

#[tokio::test]
async fn stale_commands_are_rejected_without_any_mutation() {
    let (mem, mut host) = plain_host();
    let current = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    let response = host.apply(request(current + 7, add_node("r3"))).await;
    match response {
        CommandResponse::Rejected {
            reason,
            revision,
            snapshot,
        } => {
            assert_eq!(reason, RejectReason::Stale);
            assert_eq!(revision, current);
            assert_eq!(snapshot.revision, current);
            assert!(snapshot.graph.node("r3").is_none());
        }
        other => panic!("expected stale rejection, got {other:?}"),
    }
    assert_eq!(disk_state(&mem), before, "reject must not touch disk");
    assert_eq!(host.revision(), current);
}

#[tokio::test]
async fn a_rejected_caller_can_rebase_on_the_attached_snapshot() {
    let (_mem, mut host) = plain_host();
    let _ = host.get_snapshot().await.expect("snapshot builds");

    let rejected = host.apply(request(99, add_node("r3"))).await;
    let CommandResponse::Rejected { revision, .. } = rejected else {
        panic!("expected rejection");
    };
    let retried = host.apply(request(revision, add_node("r3"))).await;
    assert_eq!(ack_revision(&retried), revision + 1);
}

#[tokio::test]
async fn failed_batches_leave_both_documents_untouched() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    // The rename writes the document and the sidecar before the missing
    // delete fails: all of it must roll back.
    let batch = Command::Batch {
        commands: vec![
            Command::EditNode {
                id: "r1".into(),
                rename_to: Some("core1".into()),
                node: NodeDef {
                    kind: Some("manual_kind".into()),
                    ..NodeDef::default()
                },
            },
            Command::DeleteNode { id: "ghost".into() },
        ],
    };
    let response = host.apply(request(revision, batch)).await;
    assert!(matches!(response, CommandResponse::Error { .. }));
    assert_eq!(disk_state(&mem), before, "rollback must be total");
    assert_eq!(host.revision(), revision, "revision must not advance");

    // The host stays usable after the rollback.
    let retried = host.apply(request(revision, add_node("r3"))).await;
    assert_eq!(ack_revision(&retried), revision + 1);
}

#[tokio::test]
async fn batches_commit_as_one_revision_step() {
    let (_mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let batch = Command::Batch {
        commands: vec![add_node("r3"), add_node("r4"), Command::DeleteNode { id: "r2".into() }],
    };
    let response = host.apply(request(revision, batch)).await;
    let next = ack_revision(&response);
    assert_eq!(next, revision + 1, "a batch is one logical mutation");

    let CommandResponse::Ack { snapshot, .. } = response else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("r3").is_some());
    assert!(snapshot.graph.node("r4").is_some());
    assert!(snapshot.graph.node("r2").is_none());
}

#[tokio::test]
async fn nested_and_history_commands_are_invalid_in_batches() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    for bad in [
        Command::Batch {
            commands: vec![Command::Undo],
        },
        Command::Batch {
            commands: vec![Command::Batch {
                commands: Vec::new(),
            }],
        },
    ] {
        let response = host.apply(request(revision, bad)).await;
        assert!(matches!(response, CommandResponse::Error { .. }));
        assert_eq!(host.revision(), revision);
    }
    assert_eq!(disk_state(&mem), before);
}

#[tokio::test]
async fn missing_sidecar_still_builds_a_snapshot() {
    let (mem, mut host) = plain_host();
    let snapshot = host.get_snapshot().await.expect("snapshot builds");

    assert!(snapshot.annotations.node_annotations.is_empty());
    assert_eq!(snapshot.graph.nodes.len(), 2);
    assert!(
        mem.contents(Path::new(ANN_PATH)).is_none(),
        "no migration applies, so no sidecar may be created"
    );
}

#[tokio::test]
async fn position_saves_land_in_the_sidecar() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let response = host
        .apply(request(
            revision,
            Command::SavePositions {
                positions: vec![NodePosition {
                    id: "r1".into(),
                    position: Position { x: 120.0, y: 48.0 },
                    geo_coordinates: None,
                }],
            },
        ))
        .await;
    let CommandResponse::Ack { snapshot, .. } = response else {
        panic!("expected ack");
    };
    assert_eq!(
        snapshot.graph.node("r1").and_then(|n| n.position),
        Some(Position { x: 120.0, y: 48.0 })
    );
    let sidecar = mem.contents(Path::new(ANN_PATH)).unwrap_or_default();
    assert!(sidecar.contains("\"nodeAnnotations\""));
    // The plain fixture carries no inline labels, so the topology file
    // must not grow any.
    let topo = mem.contents(Path::new(TOPO_PATH)).unwrap_or_default();
    assert!(!topo.contains("graph-posX"));
}

#[tokio::test]
async fn lab_settings_rewrite_keeps_canonical_order() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let response = host
        .apply(request(
            revision,
            Command::SetLabSettings {
                settings: netloom_session_proto::LabSettings {
                    name: "edge".into(),
                    prefix: Some("edge".into()),
                    mgmt: None,
                },
            },
        ))
        .await;
    let CommandResponse::Ack { snapshot, .. } = response else {
        panic!("expected ack");
    };
    assert_eq!(snapshot.lab_name, "edge");
    let settings = snapshot.lab_settings.expect("settings extracted");
    assert_eq!(settings.prefix.as_deref(), Some("edge"));

    let topo = mem.contents(Path::new(TOPO_PATH)).unwrap_or_default();
    let name_at = topo.find("name:").expect("name present");
    let prefix_at = topo.find("prefix:").expect("prefix present");
    let topo_at = topo.find("topology:").expect("topology present");
    assert!(name_at < prefix_at && prefix_at < topo_at);
}

#[tokio::test]
async fn malformed_document_surfaces_as_an_error_response() {
    // Valid YAML, wrong shape: the root must be a mapping with a name.
    let (_mem, mut host) = host_with("[1, 2, 3]\n", HostConfig::default());
    let built = host.get_snapshot().await;
    assert!(built.is_err(), "malformed document cannot build a snapshot");

    let response = host.apply(request(1, add_node("r1"))).await;
    assert!(matches!(response, CommandResponse::Error { .. }));
    assert_eq!(host.revision(), 1);
}
