//! Top-level server wiring (§5 "Concurrency model").
//!
//! `Server` owns the long-lived, shared state — the `Manager` (session
//! registry), the `Sink`/`Publisher` pair wrapping the desktop engine, the
//! `SnapshotStore`, and the publish `Scheduler` — and is the thing
//! `deskmux`'s `main.rs` constructs and runs. Accepting connections and
//! pumping bytes off a concrete transport (Unix socket, TCP, or a test
//! in-memory pipe) is deliberately left to the caller: `Server` hands back
//! a fresh `Connection` per accepted client via `accept_connection`, and
//! the caller is responsible for the read/write pump threads (§5: "per
//! connection thread/task").

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::codec::{self, Message};
use crate::config::DeskmuxConfig;
use crate::connection::Connection;
use crate::desktop::DesktopEngine;
use crate::error::{Error, Result};
use crate::ids::{PaneId, Sequence};
use crate::manager::Manager;
use crate::scheduler::Scheduler;
use crate::sink::Sink;
use crate::snapshot::{
    parse_pane_id, to_stored_node, tree_capture_to_stored_panes, SnapshotStore, StoredSnapshot,
};

/// Convert a loaded `StoredSnapshot` back into a runtime `TreeCapture`,
/// parsing each pane's hex `id` back into a `PaneId`.
fn stored_snapshot_to_tree_capture(
    stored: &StoredSnapshot,
) -> std::result::Result<crate::model::TreeCapture, crate::error::SnapshotError> {
    let root = stored.tree.as_ref().map(crate::snapshot::from_stored_node);
    let panes = stored
        .panes
        .iter()
        .map(|pane| {
            Ok(crate::model::PaneSnapshot {
                id: parse_pane_id(pane)?,
                title: pane.title.clone(),
                buffer: pane
                    .rows
                    .iter()
                    .map(|row| {
                        row.chars()
                            .map(|rune| crate::model::Cell { rune, style: crate::model::Style::default() })
                            .collect()
                    })
                    .collect(),
                rect: crate::model::Rect { x: pane.x, y: pane.y, w: pane.width, h: pane.height },
                app_type: pane.app_type.clone(),
                app_config: pane.app_config.clone(),
            })
        })
        .collect::<std::result::Result<Vec<_>, crate::error::SnapshotError>>()?;
    Ok(crate::model::TreeCapture { panes, root })
}

/// Shared server state: one per running `deskmuxd` process.
pub struct Server {
    manager: Arc<Manager>,
    sink: Arc<Sink>,
    snapshot_store: SnapshotStore,
    default_retention_limit: usize,
    scheduler: Scheduler<Box<dyn Fn(PaneId) + Send + Sync>>,
}

impl Server {
    /// Build a server around `engine`, loading a persisted snapshot from
    /// `config.snapshot_path` if one exists and is valid; a missing or
    /// corrupt snapshot is logged and the server starts with whatever
    /// state `engine` already has (§4.4, §7).
    #[must_use]
    pub fn new(
        config: &DeskmuxConfig,
        engine: Arc<dyn DesktopEngine>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let manager = Arc::new(Manager::new());
        let sink = Arc::new(Sink::new(Arc::clone(&engine)));
        let snapshot_store = SnapshotStore::new(&config.snapshot_path);

        if snapshot_store.exists() {
            match snapshot_store.load().and_then(|stored| stored_snapshot_to_tree_capture(&stored)) {
                Ok(tree) => {
                    engine.apply_tree_capture(&tree);
                    info!(path = %snapshot_store.path().display(), "loaded persisted snapshot");
                }
                Err(err) => {
                    warn!(path = %snapshot_store.path().display(), error = %err, "snapshot load failed, starting with an empty desktop");
                }
            }
        }

        let sink_for_scheduler = Arc::clone(&sink);
        let manager_for_scheduler = Arc::clone(&manager);
        let scheduler = Scheduler::new(
            runtime,
            Duration::from_millis(config.publish_fallback_delay_ms),
            Box::new(move |pane: PaneId| {
                let Some(delta) = sink_for_scheduler.publish(pane) else {
                    return;
                };
                if delta.row_deltas.is_empty() && delta.flags == 0 {
                    return;
                }
                let message = Message::BufferDelta(delta);
                for (id, session) in manager_for_scheduler.live_sessions() {
                    let frame = codec::encode_frame(id, Sequence::zero(), &message, false);
                    let _ = session.enqueue_diff(frame);
                }
            }) as Box<dyn Fn(PaneId) + Send + Sync>,
        );

        Self {
            manager,
            sink,
            snapshot_store,
            default_retention_limit: config.default_retention_limit,
            scheduler,
        }
    }

    /// Build a fresh per-client `Connection` bound to this server's shared
    /// state. The caller drives it with inbound frames and writes back
    /// whatever `Reply`s come out.
    #[must_use]
    pub fn accept_connection(&self) -> Connection {
        Connection::new(Arc::clone(&self.manager), Arc::clone(&self.sink), self.default_retention_limit)
    }

    /// Request a debounced publish for `pane` (called by the read pump
    /// after forwarding an input event that is likely to change buffer
    /// content).
    pub fn nudge(&self, pane: PaneId) {
        self.scheduler.nudge(pane);
    }

    /// Publish `pane` immediately, bypassing the debounce timer (used for
    /// the initial snapshot and for resizes, where a stale frame is
    /// actively wrong rather than just outdated).
    pub fn force_publish(&self, pane: PaneId) {
        self.scheduler.force_publish(pane);
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<Sink> {
        &self.sink
    }

    /// Capture the current desktop tree and persist it via the snapshot
    /// store's atomic write-then-rename (§4.4).
    ///
    /// # Errors
    /// Propagates `SnapshotError` as a top-level `Error` on any I/O or
    /// serialization failure.
    pub fn save_snapshot(&self) -> Result<()> {
        let tree = self.sink.capture_tree();
        let panes = tree_capture_to_stored_panes(&tree);
        let tree_node = tree.root.as_ref().map(to_stored_node);
        let stored = StoredSnapshot::from_parts(panes, tree_node);
        self.snapshot_store.save(&stored).map_err(Error::from)
    }

    #[must_use]
    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshot_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::fake::FakeDesktop;

    fn test_config(snapshot_path: std::path::PathBuf) -> DeskmuxConfig {
        let mut config = DeskmuxConfig::default();
        config.snapshot_path = snapshot_path;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn accept_connection_starts_in_awaiting_hello() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let engine = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
        let server = Server::new(&test_config(tmp.path().to_path_buf()), engine, tokio::runtime::Handle::current());
        let conn = server.accept_connection();
        assert_eq!(conn.state(), crate::connection::ConnectionState::AwaitingHello);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn save_snapshot_round_trips_through_store() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap(); // exercise "no snapshot yet" path on load
        let engine = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
        engine.set_row_text(0, "hello");
        let server = Server::new(&test_config(path.clone()), engine, tokio::runtime::Handle::current());
        server.save_snapshot().unwrap();
        let loaded = server.snapshot_store().load().unwrap();
        assert_eq!(loaded.panes.len(), 1);
        assert_eq!(loaded.panes[0].rows[0], "hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn startup_restores_persisted_snapshot() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();

        let first_engine = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
        first_engine.set_row_text(0, "restored text");
        let first_server = Server::new(&test_config(path.clone()), first_engine, tokio::runtime::Handle::current());
        first_server.save_snapshot().unwrap();

        let second_engine = Arc::new(FakeDesktop::new(PaneId::from_u128(2), "other"));
        let _second_server = Server::new(&test_config(path), Arc::clone(&second_engine), tokio::runtime::Handle::current());
        let tree = second_engine.capture_tree();
        assert_eq!(tree.panes[0].buffer[0].iter().map(|c| c.rune).collect::<String>(), "restored text");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn nudge_fans_published_delta_out_to_the_connected_session() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut config = test_config(tmp.path().to_path_buf());
        config.publish_fallback_delay_ms = 5;
        let engine = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
        let server = Server::new(&config, engine, tokio::runtime::Handle::current());

        let conn = server.accept_connection();
        conn.dispatch(Message::Hello { client_name: "test".into() }).unwrap();
        conn.dispatch(Message::ConnectRequest { session_id: crate::ids::SessionId::ZERO }).unwrap();
        let id = conn.session_id().unwrap();
        assert_eq!(server.manager().lookup(id).unwrap().stats().pending, 0);

        server.nudge(PaneId::from_u128(1));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let session = server.manager().lookup(id).unwrap();
        assert!(session.stats().pending > 0, "expected a fanned-out BufferDelta on the session queue");
    }
}
