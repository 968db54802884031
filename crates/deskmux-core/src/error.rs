//! Error types for deskmux-core.

use std::fmt::Write;
use thiserror::Error;

use crate::ids::SessionId;

/// Remediation command for resolving an error.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose.
    pub label: String,
    /// Command to run.
    pub command: String,
    /// Optional platform hint (e.g. "macOS", "Linux").
    pub platform: Option<String>,
}

/// Actionable remediation guidance for an error.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue.
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue.
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance.
    pub alternatives: Vec<String>,
    /// Optional reference for more details.
    pub learn_more: Option<String>,
}

impl Remediation {
    /// Create a new remediation with a summary.
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
            learn_more: None,
        }
    }

    /// Add a command without a platform hint.
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
            platform: None,
        });
        self
    }

    /// Add an alternative suggestion.
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Add a learn-more reference.
    #[must_use]
    pub fn learn_more(mut self, link: impl Into<String>) -> Self {
        self.learn_more = Some(link.into());
        self
    }

    /// Render remediation text for human-readable output.
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let label = cmd.platform.as_ref().map_or_else(
                    || cmd.label.clone(),
                    |platform| format!("{} ({platform})", cmd.label),
                );
                let _ = writeln!(output, "    - {label}: {}", cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        if let Some(learn_more) = &self.learn_more {
            let _ = writeln!(output, "  Learn more: {learn_more}");
        }

        output
    }
}

/// Result type alias using the library's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for deskmux-core, composed from per-subsystem kinds.
#[derive(Error, Debug)]
pub enum Error {
    /// Wire protocol framing/decoding errors.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Session queue errors.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Session registry errors.
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),

    /// Snapshot store errors.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Connection state machine errors.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors not already wrapped by a more specific kind.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors not already wrapped by a more specific kind.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Codec(err) => Some(err.remediation()),
            Self::Session(err) => Some(err.remediation()),
            Self::Manager(err) => Some(err.remediation()),
            Self::Snapshot(err) => Some(err.remediation()),
            Self::Connection(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check socket/file permissions and paths, then retry.")
                    .alternative("Verify the listener socket path and snapshot directory exist."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .alternative("Check for truncated writes or invalid UTF-8 in the snapshot file."),
            ),
        }
    }
}

/// Protocol codec errors (§4.1, §7 "Protocol violation" / "Checksum mismatch").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("bad magic number")]
    BadMagic,

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("unknown required flag bit set: {0:#x}")]
    UnknownRequiredFlag(u8),

    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: header {header_crc:#010x} != computed {computed_crc:#010x}")]
    ChecksumMismatch { header_crc: u32, computed_crc: u32 },

    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl CodecError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new("Malformed frame received; the connection must be closed.")
            .alternative("Check that client and server agree on protocol version.")
            .alternative("A checksum mismatch usually indicates a truncated or corrupted write.")
    }

    /// Protocol violations and checksum mismatches are fatal to the
    /// connection per §7; every codec error kind is one or the other.
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        true
    }
}

/// Session queue errors (§4.2, §7 "Session closed").
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Sentinel returned by `EnqueueDiff` on a closed session.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new("The session was closed; the caller must reconnect with a fresh handshake.")
    }
}

/// Session registry errors (§4.3, §7 "Session not found").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
}

impl ManagerError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new("The requested session ID is unknown to this server instance.")
            .alternative("Send ConnectRequest with a zero session ID to start a fresh session.")
    }
}

/// Snapshot store errors (§4.4, §7 "Snapshot load/save failure").
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot file is missing or incomplete")]
    Incomplete,

    #[error("content hash mismatch: stored {stored} != recomputed {recomputed}")]
    HashMismatch { stored: String, recomputed: String },

    #[error("invalid pane id {0:?} in persisted snapshot")]
    InvalidPaneId(String),
}

impl SnapshotError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Io(_) => Remediation::new(
                "Snapshot save/load failed on I/O; the running system is left undisturbed.",
            )
            .alternative("Verify the snapshot directory is writable and has free space."),
            Self::Json(_) | Self::Incomplete => Remediation::new(
                "Snapshot file is absent or unreadable; proceed with an empty desktop.",
            )
            .alternative("A prior crash mid-write should never leave a partial file, since saves write-then-rename."),
            Self::HashMismatch { .. } => Remediation::new(
                "Snapshot content hash does not match; treat the file as corrupt.",
            )
            .alternative("Delete the snapshot file to force a cold boot with an empty desktop."),
            Self::InvalidPaneId(_) => Remediation::new(
                "Snapshot pane id is not valid hex; treat the file as corrupt.",
            )
            .alternative("Delete the snapshot file to force a cold boot with an empty desktop."),
        }
    }
}

/// Connection state machine errors (§4.8, §7).
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("handshake violation: {0}")]
    HandshakeViolation(&'static str),

    /// `ConnectRequest` named a session ID the Manager does not know about.
    /// Per the resolved Open Question (see DESIGN.md), this is fatal.
    #[error("unknown session requested: {0}")]
    UnknownSession(SessionId),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::HandshakeViolation(detail) => Remediation::new(format!(
                "Client violated the handshake sequence: {detail}"
            )),
            Self::UnknownSession(_) => Remediation::new(
                "ConnectRequest named a session ID this server does not have. \
                 Reconnect with a zero session ID to start fresh.",
            ),
            Self::Codec(err) => err.remediation(),
            Self::Io(_) => Remediation::new("Socket I/O failed; the connection has been closed."),
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => {
                Remediation::new(format!("Config file not found: {path}."))
                    .alternative("Pass an explicit config path or rely on built-in defaults.")
            }
            Self::ReadFailed { path, .. } => {
                Remediation::new(format!("Failed to read config file: {path}."))
                    .alternative("Check file permissions.")
            }
            Self::ParseFailed(_) => Remediation::new("Config parse failed; fix the syntax and retry.")
                .alternative("Validate the TOML file format."),
        }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_available_for_top_level_variants() {
        let errors: Vec<Error> = vec![
            CodecError::BadMagic.into(),
            SessionError::Closed.into(),
            ManagerError::NotFound(SessionId::from_u128(1)).into(),
            SnapshotError::Incomplete.into(),
            ConnectionError::HandshakeViolation("expected Hello").into(),
            ConfigError::FileNotFound("deskmux.toml".into()).into(),
            Error::Io(std::io::Error::other("io")),
            Error::Json(serde_json::from_str::<serde_json::Value>("").unwrap_err()),
        ];
        for error in errors {
            let remediation = error.remediation().expect("missing remediation");
            assert!(!remediation.summary.is_empty());
        }
    }

    #[test]
    fn session_closed_display() {
        assert_eq!(SessionError::Closed.to_string(), "session is closed");
    }

    #[test]
    fn manager_not_found_round_trips_id() {
        let id = SessionId::from_u128(42);
        let err = ManagerError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn codec_errors_are_fatal_to_connection() {
        assert!(CodecError::BadMagic.is_fatal_to_connection());
        assert!(
            CodecError::ChecksumMismatch {
                header_crc: 1,
                computed_crc: 2
            }
            .is_fatal_to_connection()
        );
    }

    #[test]
    fn remediation_builder_chain() {
        let r = Remediation::new("summary")
            .command("Run", "deskmuxd doctor")
            .alternative("Try something else")
            .learn_more("https://example.com");
        assert_eq!(r.commands.len(), 1);
        assert_eq!(r.alternatives, vec!["Try something else"]);
        assert_eq!(r.learn_more.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn render_plain_omits_empty_sections() {
        let r = Remediation::new("Fix it");
        let output = r.render_plain();
        assert!(!output.contains("Commands:"));
        assert!(!output.contains("Alternatives:"));
    }

    #[test]
    fn from_conversions_compose() {
        let err: Error = CodecError::BadMagic.into();
        assert!(matches!(err, Error::Codec(CodecError::BadMagic)));
        let err: Error = SessionError::Closed.into();
        assert!(matches!(err, Error::Session(SessionError::Closed)));
    }
}
