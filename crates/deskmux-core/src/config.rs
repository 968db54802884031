//! On-disk configuration for the deskmux server runtime.
//!
//! Configuration is a thin, serde-backed layer; nothing here is mandatory —
//! every field has a default so a bare `deskmuxd` invocation with no config
//! file at all is a valid, fully-functional server. Per-app configuration
//! carried in `PaneSnapshot::app_config` is deliberately NOT modeled here:
//! it travels as an opaque JSON-encoded string on the wire and inside the
//! core (§9 "Dynamic-typed configuration maps"), never promoted to a static
//! schema.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly colored output for interactive use.
    #[default]
    Pretty,
    /// Machine-parseable JSON lines.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}. Expected pretty or json")),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskmuxConfig {
    /// Path to the Unix-domain socket the server listens on.
    pub listen_path: PathBuf,

    /// Path to the on-disk snapshot file (§4.4, §6 "Persisted state layout").
    pub snapshot_path: PathBuf,

    /// Default diff retention limit for newly created sessions (§3 "Session").
    pub default_retention_limit: usize,

    /// Publish scheduler fallback delay in milliseconds (§4.6, default ≈12ms).
    pub publish_fallback_delay_ms: u64,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl Default for DeskmuxConfig {
    fn default() -> Self {
        Self {
            listen_path: PathBuf::from("/tmp/deskmux.sock"),
            snapshot_path: PathBuf::from("deskmux-snapshot.json"),
            default_retention_limit: 256,
            publish_fallback_delay_ms: 12,
            logging: LogConfig::default(),
        }
    }
}

impl DeskmuxConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file does not set.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ReadFailed {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        toml::from_str(&text).map_err(|err| ConfigError::ParseFailed(err.to_string()))
    }
}
