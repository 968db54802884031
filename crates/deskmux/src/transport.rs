//! Unix-domain-socket transport: the "boilerplate" the core spec leaves at
//! its interface (§1 "low-level transport socket setup"). One OS thread per
//! accepted connection reads frames and drives `Connection::dispatch`; a
//! second thread per connection polls the session's diff queue and flushes
//! whatever the publish scheduler enqueued in the background (§5
//! "Scheduling model").

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use deskmux_core::codec::{self, HEADER_LEN};
use deskmux_core::connection::{Connection, ConnectionState, Reply};
use deskmux_core::ids::Sequence;
use deskmux_core::server::Server;

/// How often a connection's write pump checks the session queue for new
/// diffs. Comfortably below the scheduler's default 12ms fallback delay so
/// a debounced publish is flushed on its next tick rather than waiting for
/// a second one.
const WRITE_POLL_INTERVAL: Duration = Duration::from_millis(8);

/// Bind `listen_path` and accept connections until the process exits.
/// Removes a stale socket file left behind by an unclean previous shutdown
/// before binding.
pub fn serve(server: Arc<Server>, listen_path: &std::path::Path) -> std::io::Result<()> {
    if listen_path.exists() {
        std::fs::remove_file(listen_path)?;
    }
    if let Some(parent) = listen_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(listen_path)?;
    info!(path = %listen_path.display(), "listening");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let server = Arc::clone(&server);
                std::thread::spawn(move || handle_connection(server, stream));
            }
            Err(err) => warn!(error = %err, "failed to accept connection"),
        }
    }
    Ok(())
}

fn handle_connection(server: Arc<Server>, stream: UnixStream) {
    let peer = stream
        .peer_addr()
        .ok()
        .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    debug!(peer, "connection accepted");

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            error!(peer, error = %err, "failed to clone connection for write pump");
            return;
        }
    };
    let write_half = Arc::new(Mutex::new(write_stream));
    let conn = Arc::new(server.accept_connection());

    let writer_conn = Arc::clone(&conn);
    let writer_server = Arc::clone(&server);
    let writer_half = Arc::clone(&write_half);
    let writer = std::thread::spawn(move || write_pump(writer_conn, writer_server, writer_half));

    read_pump(&conn, stream, &write_half);
    conn.close();
    let _ = writer.join();
    debug!(peer, "connection closed");
}

fn read_pump(conn: &Arc<Connection>, mut stream: UnixStream, write_half: &Arc<Mutex<UnixStream>>) {
    let mut header_buf = [0u8; HEADER_LEN];
    loop {
        if let Err(err) = stream.read_exact(&mut header_buf) {
            if err.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(error = %err, "read error on connection, closing");
            }
            return;
        }
        let header = match codec::decode_header(&header_buf) {
            Ok(h) => h,
            Err(err) => {
                warn!(error = %err, "malformed frame header, closing connection");
                return;
            }
        };
        let mut frame = Vec::with_capacity(HEADER_LEN + header.payload_len as usize);
        frame.extend_from_slice(&header_buf);
        frame.resize(HEADER_LEN + header.payload_len as usize, 0);
        if let Err(err) = stream.read_exact(&mut frame[HEADER_LEN..]) {
            warn!(error = %err, "truncated frame payload, closing connection");
            return;
        }
        let message = match codec::decode_frame(&frame) {
            Ok((_, message)) => message,
            Err(err) => {
                warn!(error = %err, "failed to decode frame, closing connection");
                return;
            }
        };

        let replies = match conn.dispatch(message) {
            Ok(replies) => replies,
            Err(err) => {
                warn!(error = %err, "protocol error, closing connection");
                return;
            }
        };

        for reply in replies {
            match reply {
                Reply::Direct(message) => {
                    let session_id = conn.session_id().unwrap_or_default();
                    let bytes = codec::encode_frame(session_id, Sequence::zero(), &message, false);
                    if write_half.lock().unwrap().write_all(&bytes).is_err() {
                        return;
                    }
                }
                Reply::Queued(message) => {
                    if conn.enqueue(&message).is_err() {
                        return;
                    }
                }
                Reply::None => {}
            }
        }
    }
}

fn write_pump(conn: Arc<Connection>, server: Arc<Server>, write_half: Arc<Mutex<UnixStream>>) {
    let mut last_sent = Sequence::zero();
    loop {
        std::thread::sleep(WRITE_POLL_INTERVAL);
        if conn.state() == ConnectionState::Closed {
            return;
        }
        let Some(session_id) = conn.session_id() else { continue };
        let Ok(session) = server.manager().lookup(session_id) else {
            return;
        };
        let packets = session.pending_since(last_sent);
        if packets.is_empty() {
            continue;
        }
        let mut stream = write_half.lock().unwrap();
        for packet in packets {
            if stream.write_all(&packet.payload).is_err() {
                return;
            }
            last_sent = packet.sequence;
        }
    }
}
