// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Minimal Unix-socket JSON-lines host daemon.
//!
//! One topology host per process; every connected renderer gets an init
//! snapshot push, sends `getSnapshot`/`apply`/`resync` requests, and
//! receives resync pushes whenever another connection commits a mutation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use netloom_fs::TokioFs;
use netloom_host_core::{HostConfig, TopologyHost};
use netloom_session_proto::{CommandRequest, CommandResponse, PushReason, SnapshotPush};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostPrefs {
    socket_path: String,
    topology_path: String,
    history_limit: usize,
}

impl Default for HostPrefs {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path().display().to_string(),
            topology_path: "lab.clab.yml".to_owned(),
            history_limit: HostConfig::default().history_limit,
        }
    }
}

/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to
/// `/tmp` when unavailable.
fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("netloom-host.sock")
}

fn prefs_path() -> Option<PathBuf> {
    let proj = directories::ProjectDirs::from("dev", "flyingrobots", "Netloom")?;
    Some(proj.config_dir().join("session_host.json"))
}

/// Load prefs from the platform config dir, persisting defaults once if
/// absent (best-effort; the daemon runs fine without a config dir).
fn load_prefs() -> HostPrefs {
    let Some(path) = prefs_path() else {
        return HostPrefs::default();
    };
    if let Ok(text) = std::fs::read_to_string(&path) {
        if let Ok(prefs) = serde_json::from_str::<HostPrefs>(&text) {
            return prefs;
        }
        warn!(path = %path.display(), "unreadable prefs; using defaults");
    }
    let prefs = HostPrefs::default();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(text) = serde_json::to_string_pretty(&prefs) {
        let _ = std::fs::write(&path, text);
    }
    prefs
}

/// One inbound request line.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum WireRequest {
    GetSnapshot,
    Apply { request: CommandRequest },
    Resync,
}

/// One outbound reply line.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum WireReply {
    Push {
        #[serde(flatten)]
        push: SnapshotPush,
    },
    Response {
        response: CommandResponse,
    },
    ProtocolError {
        message: String,
    },
}

#[derive(Default)]
struct HubState {
    next_conn_id: u64,
    conns: HashMap<u64, tokio::sync::mpsc::Sender<String>>,
}

struct Shared {
    host: Mutex<TopologyHost>,
    hub: Mutex<HubState>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let prefs = load_prefs();
    let topology_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| prefs.topology_path.clone());
    let config = HostConfig {
        history_limit: prefs.history_limit,
        ..HostConfig::default()
    };
    let host = TopologyHost::new(Arc::new(TokioFs::new()), &topology_path, config);
    let shared = Arc::new(Shared {
        host: Mutex::new(host),
        hub: Mutex::new(HubState::default()),
    });

    // Remove stale socket if present
    let _ = std::fs::remove_file(&prefs.socket_path);
    let listener = UnixListener::bind(&prefs.socket_path)
        .with_context(|| format!("binding {}", prefs.socket_path))?;
    info!(socket = %prefs.socket_path, topology = %topology_path, "netloom host listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let shared = shared.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, shared).await {
                warn!(?err, "client handler error");
            }
        });
    }
}

async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);
    let conn_id = {
        let mut hub = shared.hub.lock().await;
        let id = hub.next_conn_id;
        hub.next_conn_id += 1;
        hub.conns.insert(id, tx.clone());
        id
    };

    // Greet with the init snapshot before accepting requests.
    let init = {
        let mut host = shared.host.lock().await;
        match host.init_push().await {
            Ok(push) => WireReply::Push { push },
            Err(err) => WireReply::ProtocolError {
                message: err.to_string(),
            },
        }
    };
    let _ = tx.send(serde_json::to_string(&init)?).await;

    // Writer task drains the outbox.
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => {
                let mut host = shared.host.lock().await;
                handle_request(request, &mut host).await
            }
            Err(err) => WireReply::ProtocolError {
                message: err.to_string(),
            },
        };
        let committed = matches!(
            &reply,
            WireReply::Response {
                response: CommandResponse::Ack { .. }
            }
        );
        let _ = tx.send(serde_json::to_string(&reply)?).await;
        if committed {
            broadcast_resync(&shared, conn_id).await;
        }
    }

    shared.hub.lock().await.conns.remove(&conn_id);
    Ok(())
}

async fn handle_request(request: WireRequest, host: &mut TopologyHost) -> WireReply {
    match request {
        WireRequest::GetSnapshot => match host.get_snapshot().await {
            Ok(snapshot) => WireReply::Push {
                push: SnapshotPush {
                    reason: PushReason::Init,
                    snapshot,
                },
            },
            Err(err) => WireReply::ProtocolError {
                message: err.to_string(),
            },
        },
        WireRequest::Apply { request } => WireReply::Response {
            response: host.apply(request).await,
        },
        WireRequest::Resync => match host.resync_push().await {
            Ok(push) => WireReply::Push { push },
            Err(err) => WireReply::ProtocolError {
                message: err.to_string(),
            },
        },
    }
}

/// Push the post-commit snapshot to every other connection.
async fn broadcast_resync(shared: &Arc<Shared>, origin: u64) {
    let push = {
        let mut host = shared.host.lock().await;
        match host.get_snapshot().await {
            Ok(snapshot) => SnapshotPush {
                reason: PushReason::Resync,
                snapshot,
            },
            Err(err) => {
                warn!(%err, "post-commit snapshot unavailable; skipping broadcast");
                return;
            }
        }
    };
    let Ok(line) = serde_json::to_string(&WireReply::Push { push }) else {
        return;
    };
    let conns: Vec<_> = {
        let hub = shared.hub.lock().await;
        hub.conns
            .iter()
            .filter(|(id, _)| **id != origin)
            .map(|(_, tx)| tx.clone())
            .collect()
    };
    for tx in conns {
        let _ = tx.send(line.clone()).await;
    }
}
