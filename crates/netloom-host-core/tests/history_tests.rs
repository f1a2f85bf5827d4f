// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Undo/redo round-trips, merge-coalescing, and external-change resync.
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use common::{
    ack_revision, coalescing_config, disk_state, host_with, no_coalescing_config, plain_host,
    request, PLAIN_DOC, TOPO_PATH,
};
use netloom_session_proto::{
    Command, CommandRequest, CommandResponse, NodeDef, NodePosition, Position, PushReason,
};

fn add_node(id: &str) -> Command {
    Command::AddNode {
        id: id.into(),
        node: NodeDef {
            kind: Some("manual_kind".into()),
            ..NodeDef::default()
        },
    }
}

fn rename(from: &str, to: &str) -> Command {
    Command::EditNode {
        id: from.into(),
        rename_to: Some(to.into()),
        node: NodeDef {
            kind: Some("manual_kind".into()),
            ..NodeDef::default()
        },
    }
}

#[tokio::test]
async fn undo_restores_the_exact_pre_command_bytes() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    let applied = host.apply(request(revision, add_node("r9"))).await;
    let after_revision = ack_revision(&applied);
    let after = disk_state(&mem);
    assert_ne!(after, before, "the command must have changed disk state");

    let undone = host.apply(request(after_revision, Command::Undo)).await;
    let undo_revision = ack_revision(&undone);
    assert_eq!(
        undo_revision,
        after_revision + 1,
        "undo advances the revision, it does not rewind it"
    );
    assert_eq!(disk_state(&mem), before, "undo must restore bytes verbatim");

    let CommandResponse::Ack { snapshot, .. } = undone else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("r9").is_none());
    assert!(snapshot.can_redo);

    let redone = host.apply(request(undo_revision, Command::Redo)).await;
    assert_eq!(ack_revision(&redone), undo_revision + 1);
    assert_eq!(disk_state(&mem), after, "redo must restore the post-command bytes");
}

#[tokio::test]
async fn the_concrete_add_undo_scenario_from_the_contract() {
    let (_mem, mut host) = plain_host();
    assert_eq!(host.get_snapshot().await.expect("snapshot builds").revision, 1);

    let applied = host
        .apply(request(
            1,
            Command::AddNode {
                id: "r1x".into(),
                node: NodeDef {
                    kind: Some("manual_kind".into()),
                    ..NodeDef::default()
                },
            },
        ))
        .await;
    let CommandResponse::Ack { revision, snapshot } = applied else {
        panic!("expected ack");
    };
    assert_eq!(revision, 2);
    assert!(snapshot.graph.node("r1x").is_some());

    let undone = host.apply(request(2, Command::Undo)).await;
    let CommandResponse::Ack { revision, snapshot } = undone else {
        panic!("expected ack");
    };
    assert_eq!(revision, 3);
    assert!(snapshot.graph.node("r1x").is_none());
    assert!(snapshot.can_redo);
}

#[tokio::test]
async fn undo_on_an_empty_stack_is_a_noop_ack() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    let response = host.apply(request(revision, Command::Undo)).await;
    let CommandResponse::Ack {
        revision: unchanged,
        snapshot,
    } = response
    else {
        panic!("expected ack");
    };
    assert_eq!(unchanged, revision, "empty-stack undo keeps the revision");
    assert!(!snapshot.can_undo);
    assert_eq!(disk_state(&mem), before);
}

#[tokio::test]
async fn a_new_mutation_clears_the_redo_stack() {
    let (_mem, mut host) = plain_host();
    let r1 = host.get_snapshot().await.expect("snapshot builds").revision;
    let r2 = ack_revision(&host.apply(request(r1, add_node("a"))).await);
    let r3 = ack_revision(&host.apply(request(r2, Command::Undo)).await);

    // Redo is available...
    let snap = host.get_snapshot().await.expect("snapshot builds");
    assert!(snap.can_redo);

    // ...until an unrelated mutation invalidates forward history.
    let r4 = ack_revision(&host.apply(request(r3, add_node("b"))).await);
    let snap = host.get_snapshot().await.expect("snapshot builds");
    assert!(!snap.can_redo);

    let redone = host.apply(request(r4, Command::Redo)).await;
    assert_eq!(ack_revision(&redone), r4, "empty-stack redo keeps the revision");
}

#[tokio::test]
async fn renames_inside_the_window_coalesce_into_one_undo_step() {
    let (mem, mut host) = host_with(PLAIN_DOC, coalescing_config());
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let before = disk_state(&mem);

    // Three keystroke-like renames land inside one merge window.
    let r2 = ack_revision(&host.apply(request(revision, rename("r1", "c"))).await);
    let r3 = ack_revision(&host.apply(request(r2, rename("c", "co"))).await);
    let r4 = ack_revision(&host.apply(request(r3, rename("co", "core"))).await);

    let undone = host.apply(request(r4, Command::Undo)).await;
    let CommandResponse::Ack { snapshot, .. } = undone else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("r1").is_some(), "one undo reverts all renames");
    assert!(!snapshot.can_undo, "the renames formed exactly one history entry");
    assert_eq!(disk_state(&mem), before);
}

#[tokio::test]
async fn separate_entries_without_a_merge_window() {
    let (_mem, mut host) = host_with(PLAIN_DOC, no_coalescing_config());
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let r2 = ack_revision(&host.apply(request(revision, rename("r1", "c"))).await);
    let r3 = ack_revision(&host.apply(request(r2, rename("c", "core"))).await);

    let first_undo = host.apply(request(r3, Command::Undo)).await;
    let CommandResponse::Ack { revision: r4, snapshot } = first_undo else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("c").is_some(), "only the second rename reverted");
    assert!(snapshot.can_undo);

    let second_undo = host.apply(request(r4, Command::Undo)).await;
    let CommandResponse::Ack { snapshot, .. } = second_undo else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("r1").is_some());
}

#[tokio::test]
async fn a_non_rename_command_merges_then_closes_the_window() {
    let (_mem, mut host) = host_with(PLAIN_DOC, coalescing_config());
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let r2 = ack_revision(&host.apply(request(revision, rename("r1", "core"))).await);
    // Inside the window: merged into the rename's entry, and the window
    // closes because this is not a rename.
    let r3 = ack_revision(&host.apply(request(r2, add_node("x"))).await);
    // After the close: a fresh entry of its own.
    let r4 = ack_revision(&host.apply(request(r3, add_node("y"))).await);

    let undone = host.apply(request(r4, Command::Undo)).await;
    let CommandResponse::Ack { ref snapshot, .. } = undone else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("y").is_none(), "last entry reverts only y");
    assert!(snapshot.graph.node("x").is_some() || !snapshot.can_undo);

    let undone = host.apply(request(ack_revision(&undone), Command::Undo)).await;
    let CommandResponse::Ack { snapshot, .. } = undone else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("r1").is_some(), "merged entry reverts rename + x");
    assert!(snapshot.graph.node("x").is_none());
}

#[tokio::test]
async fn skip_history_saves_are_not_undoable() {
    let (_mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;

    let response = host
        .apply(CommandRequest {
            base_revision: revision,
            skip_history: true,
            command: Command::SavePositions {
                positions: vec![NodePosition {
                    id: "r1".into(),
                    position: Position { x: 10.0, y: 20.0 },
                    geo_coordinates: None,
                }],
            },
        })
        .await;
    let CommandResponse::Ack { revision, snapshot } = response else {
        panic!("expected ack");
    };
    assert_eq!(revision, 2, "skip-history commands still bump the revision");
    assert!(!snapshot.can_undo, "nothing was pushed to history");
}

#[tokio::test]
async fn external_changes_clear_history_and_push_a_fresh_snapshot() {
    let (mem, mut host) = plain_host();
    let revision = host.get_snapshot().await.expect("snapshot builds").revision;
    let r2 = ack_revision(&host.apply(request(revision, add_node("r3"))).await);

    // Someone edits the file behind the host's back.
    mem.seed(
        TOPO_PATH,
        "name: rewritten\ntopology:\n  nodes:\n    solo:\n      kind: manual_kind\n",
    );
    let push = host.on_external_change().await.expect("resync succeeds");
    assert_eq!(push.reason, PushReason::ExternalChange);
    assert_eq!(push.snapshot.revision, r2 + 1);
    assert_eq!(push.snapshot.lab_name, "rewritten");
    assert!(push.snapshot.graph.node("solo").is_some());
    assert!(!push.snapshot.can_undo, "history is invalid after external edits");
    assert!(!push.snapshot.can_redo);

    let undone = host.apply(request(push.snapshot.revision, Command::Undo)).await;
    let CommandResponse::Ack { snapshot, .. } = undone else {
        panic!("expected ack");
    };
    assert!(snapshot.graph.node("solo").is_some(), "undo has nothing to revert");
}
