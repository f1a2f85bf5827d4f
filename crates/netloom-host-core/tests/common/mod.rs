// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared fixtures for host-core integration tests.
#![allow(dead_code, clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use netloom_fs::MemFs;
use netloom_host_core::{HostConfig, TopologyHost};
use netloom_session_proto::{Command, CommandRequest, CommandResponse, Revision};

/// Topology whose node kinds trigger no migrations: snapshots leave the
/// sidecar untouched unless a command writes it.
pub const PLAIN_DOC: &str = "\
name: corelab
topology:
  nodes:
    r1:
      kind: manual_kind
    r2:
      kind: manual_kind
  links:
    - endpoints: [\"r1:e1-1\", \"r2:e1-1\"]
";

pub const TOPO_PATH: &str = "lab.clab.yml";
pub const ANN_PATH: &str = "lab.clab.annotations.json";

pub fn host_with(doc: &str, config: HostConfig) -> (Arc<MemFs>, TopologyHost) {
    let mem = Arc::new(MemFs::new());
    mem.seed(TOPO_PATH, doc);
    let host = TopologyHost::new(mem.clone(), TOPO_PATH, config);
    (mem, host)
}

pub fn plain_host() -> (Arc<MemFs>, TopologyHost) {
    host_with(PLAIN_DOC, HostConfig::default())
}

/// Current on-disk pair (topology text, sidecar text if present).
pub fn disk_state(mem: &MemFs) -> (String, Option<String>) {
    (
        mem.contents(Path::new(TOPO_PATH)).unwrap_or_default(),
        mem.contents(Path::new(ANN_PATH)),
    )
}

pub fn request(base_revision: Revision, command: Command) -> CommandRequest {
    CommandRequest {
        base_revision,
        skip_history: false,
        command,
    }
}

pub fn ack_revision(response: &CommandResponse) -> Revision {
    match response {
        CommandResponse::Ack { revision, .. } => *revision,
        other => panic!("expected ack, got {other:?}"),
    }
}

/// A merge window long enough that consecutive test commands always land
/// inside it.
pub fn coalescing_config() -> HostConfig {
    HostConfig {
        merge_window: Duration::from_secs(30),
        ..HostConfig::default()
    }
}

/// A zero merge window: every command gets its own history entry.
pub fn no_coalescing_config() -> HostConfig {
    HostConfig {
        merge_window: Duration::ZERO,
        ..HostConfig::default()
    }
}
