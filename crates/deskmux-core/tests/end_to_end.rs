//! End-to-end scenarios, seeded directly from the literal values in the
//! spec's testable-properties section: a fresh connect-and-ack, a resume
//! after disconnect, and a desktop-originated fan-out to every attached
//! connection.
//!
//! Individual invariants (retention drop, ack idempotence, encode/decode
//! round trips, scheduler debounce) already have focused unit tests inside
//! their owning modules; this file exercises the same components wired
//! together the way a real client/server exchange would.

use std::sync::Arc;

use deskmux_core::codec::{self, Message};
use deskmux_core::desktop::fake::FakeDesktop;
use deskmux_core::desktop::DesktopEngine;
use deskmux_core::ids::{PaneId, SessionId, Sequence};
use deskmux_core::manager::Manager;
use deskmux_core::model::{BufferDelta, CellSpan, RowDelta, Style};
use deskmux_core::session::Session;
use deskmux_core::sink::Sink;

use deskmux_core::connection::Connection;

fn fresh_setup() -> (Arc<Manager>, Arc<Sink>, Arc<FakeDesktop>) {
    let manager = Arc::new(Manager::new());
    let fake = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
    let sink = Arc::new(Sink::new(Arc::clone(&fake) as Arc<dyn DesktopEngine>));
    (manager, sink, fake)
}

fn handshake(conn: &Connection) -> SessionId {
    conn.dispatch(Message::Hello { client_name: "client".into() }).unwrap();
    conn.dispatch(Message::ConnectRequest { session_id: SessionId::ZERO }).unwrap();
    conn.session_id().unwrap()
}

/// Scenario 1 (spec §8): fresh connect, server enqueues one `BufferDelta`,
/// client acks it, and the session's pending queue is empty afterward.
#[test]
fn fresh_connect_and_first_diff_acked() {
    let (manager, sink, _fake) = fresh_setup();
    let conn = Connection::new(Arc::clone(&manager), Arc::clone(&sink), 64);
    let id = handshake(&conn);
    let session = manager.lookup(id).unwrap();

    let delta = Message::BufferDelta(BufferDelta {
        pane_id: PaneId::from_u128(1),
        revision: 1,
        flags: 0,
        style_table: vec![Style::default()],
        row_deltas: vec![RowDelta {
            row_index: 0,
            spans: vec![CellSpan { start_col: 0, style_index: 0, text: "Hello".into() }],
        }],
    });
    let (_, seq) = conn.enqueue(&delta).unwrap();
    assert_eq!(seq.get(), 1);
    assert_eq!(session.stats().pending, 1);

    conn.dispatch(Message::BufferAck { acked_sequence: seq }).unwrap();
    assert!(session.pending().is_empty());
}

/// Scenario 3 (spec §8): client A acks partway then disconnects; further
/// diffs queue offline; client B resumes the same session id and replays
/// exactly what A never acked.
#[test]
fn resume_after_disconnect_replays_unacked_diffs() {
    let (manager, sink, _fake) = fresh_setup();

    let conn_a = Connection::new(Arc::clone(&manager), Arc::clone(&sink), 64);
    let id = handshake(&conn_a);
    let session = manager.lookup(id).unwrap();

    let seq1 = session.enqueue_diff(codec::encode_frame(
        id,
        Sequence::zero(),
        &Message::Ping { timestamp: 1 },
        false,
    )).unwrap();
    conn_a.dispatch(Message::BufferAck { acked_sequence: seq1 }).unwrap();
    conn_a.close();

    // Two more diffs queue while nobody is connected.
    session.enqueue_diff(codec::encode_frame(id, Sequence::zero(), &Message::Ping { timestamp: 2 }, false)).unwrap();
    session.enqueue_diff(codec::encode_frame(id, Sequence::zero(), &Message::Ping { timestamp: 3 }, false)).unwrap();
    assert_eq!(session.stats().pending, 2);

    let conn_b = Connection::new(Arc::clone(&manager), Arc::clone(&sink), 64);
    conn_b.dispatch(Message::Hello { client_name: "client-b".into() }).unwrap();
    let replies = conn_b
        .dispatch(Message::ResumeRequest { session_id: id, last_sequence: seq1 })
        .unwrap();
    // ConnectAccept + the two diffs B never saw.
    assert_eq!(replies.len(), 3);

    session.ack(session.last_sequence());
    assert!(session.pending().is_empty());
}

/// Scenario 4 (spec §8): a desktop-originated publish fans out to every
/// attached connection's session, not just whichever one triggered it.
#[test]
fn published_delta_fans_out_to_every_live_session() {
    let (manager, sink, fake) = fresh_setup();

    let conn_a = Connection::new(Arc::clone(&manager), Arc::clone(&sink), 64);
    let conn_b = Connection::new(Arc::clone(&manager), Arc::clone(&sink), 64);
    let id_a = handshake(&conn_a);
    let id_b = handshake(&conn_b);
    assert_ne!(id_a, id_b);

    fake.set_row_text(0, "updated content");
    let delta = sink.publish(PaneId::from_u128(1)).expect("pane is live");
    let message = Message::BufferDelta(delta);

    for (fan_id, session) in manager.live_sessions() {
        let frame = codec::encode_frame(fan_id, Sequence::zero(), &message, false);
        session.enqueue_diff(frame).unwrap();
    }

    let session_a = manager.lookup(id_a).unwrap();
    let session_b = manager.lookup(id_b).unwrap();
    assert!(session_a.stats().pending > 0);
    assert!(session_b.stats().pending > 0);
}

/// Boundary behavior (spec §8): acking past the last queued sequence trims
/// the entire queue rather than erroring.
#[test]
fn ack_past_end_of_queue_trims_everything() {
    let session = Session::new(8);
    for i in 0..3u8 {
        session.enqueue_diff(vec![i]).unwrap();
    }
    session.ack(Sequence::new(999));
    assert!(session.pending().is_empty());
}
