//! Per-client connection state machine (§4.8).
//!
//! A `Connection` enforces the handshake order (`Hello` → `Welcome` →
//! `ConnectRequest`/`ResumeRequest` → `ConnectAccept` → serving), then
//! dispatches every subsequent inbound message either straight into the
//! `Sink` (input events) or as a direct reply (`Ping`/`Pong`,
//! `ClipboardGet`/`ClipboardData`, `ThemeUpdate`/`ThemeAck`). Data frames
//! that must survive a disconnect (`TreeSnapshot`, `BufferDelta`,
//! `PaneState`, `StateUpdate`) are pushed through the owning `Session`'s
//! diff queue instead of replied to directly, so they get a sequence
//! number and participate in ack-driven retention.
//!
//! This module owns no socket I/O: it is driven by whatever reads frames
//! off the wire (see `server.rs`), and produces either direct replies or
//! queued frames for that caller to write back out.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{self, Message, PaneSnapshotWire};
use crate::desktop::{KeyEvent, MouseEvent};
use crate::error::ConnectionError;
use crate::ids::{SessionId, Sequence};
use crate::manager::Manager;
use crate::model::TreeCapture;
use crate::session::Session;
use crate::sink::Sink;

/// Where a `Connection` currently is in the handshake/serving lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the client's `Hello`.
    AwaitingHello,
    /// `Hello`/`Welcome` exchanged; waiting for `ConnectRequest` or
    /// `ResumeRequest`.
    AwaitingConnect,
    /// Handshake complete; normal message dispatch.
    Serving,
    /// Connection torn down; no further messages are accepted.
    Closed,
}

/// A reply produced by dispatching one inbound message.
pub enum Reply {
    /// Send immediately, outside the session's sequence numbering
    /// (`Welcome`, `ConnectAccept`, `Pong`, `ClipboardData`, `ThemeAck`).
    Direct(Message),
    /// Enqueue on the session's diff queue, which assigns the sequence
    /// number (`TreeSnapshot`, `BufferDelta`, `PaneState`, `StateUpdate`).
    Queued(Message),
    /// Nothing to send back (e.g. a `KeyEvent` that was only forwarded to
    /// the desktop engine).
    None,
}

/// Per-client protocol state machine.
pub struct Connection {
    manager: Arc<Manager>,
    sink: Arc<Sink>,
    default_retention_limit: usize,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<(SessionId, Arc<Session>)>>,
}

impl Connection {
    #[must_use]
    pub fn new(manager: Arc<Manager>, sink: Arc<Sink>, default_retention_limit: usize) -> Self {
        Self {
            manager,
            sink,
            default_retention_limit,
            state: Mutex::new(ConnectionState::AwaitingHello),
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|(id, _)| *id)
    }

    /// Dispatch one inbound message, returning zero or more replies.
    ///
    /// # Errors
    /// Returns `ConnectionError::HandshakeViolation` if a message arrives
    /// out of order, and `ConnectionError::UnknownSession` if a
    /// `ConnectRequest`/`ResumeRequest` names a session ID this server has
    /// never seen (the resolved Open Question — see DESIGN.md — treats
    /// this as fatal rather than silently starting a new session).
    pub fn dispatch(&self, message: Message) -> Result<Vec<Reply>, ConnectionError> {
        match self.state() {
            ConnectionState::Closed => Err(ConnectionError::HandshakeViolation(
                "message received after connection closed",
            )),
            ConnectionState::AwaitingHello => self.dispatch_hello(message),
            ConnectionState::AwaitingConnect => self.dispatch_connect(message),
            ConnectionState::Serving => Ok(self.dispatch_serving(message)),
        }
    }

    fn dispatch_hello(&self, message: Message) -> Result<Vec<Reply>, ConnectionError> {
        match message {
            Message::Hello { .. } => {
                *self.state.lock() = ConnectionState::AwaitingConnect;
                Ok(vec![Reply::Direct(Message::Welcome { server_name: "deskmux".to_string() })])
            }
            _ => Err(ConnectionError::HandshakeViolation("expected Hello first")),
        }
    }

    fn dispatch_connect(&self, message: Message) -> Result<Vec<Reply>, ConnectionError> {
        match message {
            Message::ConnectRequest { session_id } => {
                let (id, session) = if session_id.is_zero() {
                    self.manager.new_session(self.default_retention_limit)
                } else {
                    let session = self
                        .manager
                        .lookup(session_id)
                        .map_err(|_| ConnectionError::UnknownSession(session_id))?;
                    (session_id, session)
                };
                *self.session.lock() = Some((id, session));
                *self.state.lock() = ConnectionState::Serving;
                let mut replies = vec![Reply::Direct(Message::ConnectAccept {
                    session_id: id,
                    resume_supported: true,
                })];
                replies.extend(self.initial_tree_snapshot());
                Ok(replies)
            }
            Message::ResumeRequest { session_id, last_sequence } => {
                let session = self
                    .manager
                    .lookup(session_id)
                    .map_err(|_| ConnectionError::UnknownSession(session_id))?;
                *self.session.lock() = Some((session_id, Arc::clone(&session)));
                *self.state.lock() = ConnectionState::Serving;
                let mut replies = vec![Reply::Direct(Message::ConnectAccept {
                    session_id,
                    resume_supported: true,
                })];
                for packet in session.pending_since(last_sequence) {
                    replies.push(Reply::Direct(decode_queued_payload(&packet.payload)?));
                }
                Ok(replies)
            }
            _ => Err(ConnectionError::HandshakeViolation(
                "expected ConnectRequest or ResumeRequest after Welcome",
            )),
        }
    }

    fn dispatch_serving(&self, message: Message) -> Vec<Reply> {
        match message {
            Message::KeyEvent { key_code, rune_value, modifiers } => {
                if let Some(pane) = self.sink.active_pane_id() {
                    self.sink.handle_key_event(pane, KeyEvent { key_code, rune_value, modifiers });
                }
                vec![Reply::None]
            }
            Message::MouseEvent { x, y, button_mask, modifiers } => {
                if let Some(pane) = self.sink.active_pane_id() {
                    self.sink.handle_mouse_event(pane, MouseEvent { x, y, button_mask, modifiers });
                }
                vec![Reply::None]
            }
            Message::Resize { cols, rows } => {
                let Some(pane) = self.sink.active_pane_id() else {
                    return vec![Reply::None];
                };
                self.sink.handle_resize(pane, cols, rows);
                // §4.8: a resize invalidates the client's whole view of the
                // pane, so it gets a fresh TreeSnapshot and per-pane state
                // rather than waiting on the next debounced publish.
                let mut replies = vec![Reply::Queued(tree_to_message(&self.sink.capture_tree()))];
                for (pane_id, state) in self.sink.pane_states() {
                    replies.push(Reply::Queued(Message::PaneState {
                        pane_id,
                        flags: state.to_flags(),
                        z_order: state.z_order,
                    }));
                }
                if let Some(delta) = self.sink.publish(pane) {
                    replies.push(Reply::Queued(Message::BufferDelta(delta)));
                }
                replies
            }
            Message::Paste { data } => {
                if let Some(pane) = self.sink.active_pane_id() {
                    self.sink.handle_paste(pane, &data);
                }
                vec![Reply::None]
            }
            Message::ClipboardSet { data } => {
                self.sink.handle_clipboard_set(&data);
                // §4.8: read the clipboard back and, if the engine actually
                // has something, hand it back as a ClipboardData reply.
                let readback = self.sink.handle_clipboard_get();
                if readback.is_empty() {
                    vec![Reply::None]
                } else {
                    vec![Reply::Direct(Message::ClipboardData { data: readback })]
                }
            }
            Message::ClipboardGet => {
                vec![Reply::Direct(Message::ClipboardData { data: self.sink.handle_clipboard_get() })]
            }
            Message::ThemeUpdate { theme_json } => {
                self.sink.handle_theme_update(&theme_json);
                vec![Reply::Direct(Message::ThemeAck { theme_json })]
            }
            Message::Ping { timestamp } => vec![Reply::Direct(Message::Pong { timestamp })],
            Message::BufferAck { acked_sequence } => {
                if let Some((_, session)) = self.session.lock().as_ref() {
                    session.ack(acked_sequence);
                }
                vec![Reply::None]
            }
            other => {
                // Anything else arriving mid-serve (e.g. a stray ConnectRequest)
                // is ignored rather than treated as fatal; only the handshake
                // phases enforce strict ordering.
                let _ = other;
                vec![Reply::None]
            }
        }
    }

    fn initial_tree_snapshot(&self) -> Vec<Reply> {
        if let Some((_, session)) = self.session.lock().as_ref() {
            session.record_snapshot_sent();
        }
        let tree = self.sink.capture_tree();
        vec![Reply::Queued(tree_to_message(&tree))]
    }

    /// Enqueue `message` on this connection's session, assigning it the
    /// next sequence and encoding it to bytes for the write pump.
    ///
    /// # Errors
    /// Returns `ConnectionError::HandshakeViolation` if called before a
    /// session has been established, and propagates
    /// `SessionError::Closed` (wrapped) if the session has since closed.
    pub fn enqueue(&self, message: &Message) -> Result<(SessionId, Sequence), ConnectionError> {
        let guard = self.session.lock();
        let (id, session) = guard
            .as_ref()
            .ok_or(ConnectionError::HandshakeViolation("no session established yet"))?;
        let payload = codec::encode_frame(*id, Sequence::zero(), message, false);
        let sequence = session
            .enqueue_diff(payload)
            .map_err(|_| ConnectionError::HandshakeViolation("session closed"))?;
        Ok((*id, sequence))
    }

    /// Mark the connection closed, releasing it from further dispatch.
    pub fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }
}

fn tree_to_message(tree: &TreeCapture) -> Message {
    let panes = tree
        .panes
        .iter()
        .map(|pane| PaneSnapshotWire {
            pane_id: pane.id,
            title: pane.title.clone(),
            rows: pane
                .buffer
                .iter()
                .map(|row| row.iter().map(|cell| cell.rune).collect())
                .collect(),
            x: pane.rect.x,
            y: pane.rect.y,
            w: pane.rect.w,
            h: pane.rect.h,
            app_type: pane.app_type.clone(),
            app_config: pane.app_config.clone(),
        })
        .collect();
    Message::TreeSnapshot { panes, root: tree.root.clone() }
}

/// Decode a queued frame's raw payload bytes back into a `Message`, for
/// replaying pending diffs on resume.
fn decode_queued_payload(payload: &[u8]) -> Result<Message, ConnectionError> {
    // Queued payloads were produced by `encode_frame`, so they are
    // themselves complete frames (header + payload); re-decode the whole
    // thing to recover the typed message.
    let (_, message) = codec::decode_frame(payload)?;
    Ok(message)
}
