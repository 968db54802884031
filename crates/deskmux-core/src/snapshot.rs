//! Durable snapshot persistence (§4.4 "Snapshot store").
//!
//! The desktop's pane tree is periodically captured and written to disk so
//! a restart can resume from the last known layout. Saves are atomic
//! (write to a temp file, `fsync`, then rename over the target) and
//! content-addressed: the stored JSON carries a SHA-1 hash over a
//! canonical byte encoding of the tree, checked on load so a half-written
//! or hand-edited file is detected rather than silently trusted.
//!
//! The persisted schema is deliberately its own type (`StoredPane`), not
//! the binary-wire `PaneSnapshotWire` used by `TreeSnapshot` frames: the
//! wire format is a fixed byte layout with no serde involvement, while the
//! on-disk format is JSON with its own stable field names (§6).

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::SnapshotError;
use crate::ids::PaneId;
use crate::model::{Split, TreeCapture, TreeNodeCapture};

/// JSON-friendly persisted form of a pane (§6 "Persisted state layout").
/// `id` is the pane's 32-hex-char `Display` form, not the raw `u128`, so
/// the schema never depends on `PaneId` growing serde impls of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPane {
    pub id: String,
    pub title: String,
    pub rows: Vec<String>,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub app_type: String,
    pub app_config: String,
}

/// The on-disk JSON layout for a persisted snapshot (§6 "Persisted state
/// layout"). Field names are part of the stable on-disk contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub schema_version: u32,
    /// RFC3339 UTC timestamp of when this snapshot was captured.
    pub timestamp: DateTime<Utc>,
    pub panes: Vec<StoredPane>,
    pub tree: Option<StoredTreeNode>,
    /// Lowercase hex SHA-1 over `canonical_hash(panes, tree)`.
    pub hash: String,
}

/// JSON-friendly mirror of `TreeNodeCapture` (the runtime type uses
/// `Option<usize>`/`Split`, which round-trip through serde fine on their
/// own, but a dedicated wire type keeps the persisted schema decoupled
/// from internal representation changes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTreeNode {
    pub pane_index: Option<usize>,
    pub split: Split,
    pub ratios: Vec<f64>,
    pub children: Vec<StoredTreeNode>,
}

const CURRENT_SCHEMA_VERSION: u32 = 1;

impl StoredSnapshot {
    /// Build a `StoredSnapshot` from a live `TreeCapture`'s persisted form,
    /// stamping the current time and computing its content hash.
    #[must_use]
    pub fn from_parts(panes: Vec<StoredPane>, tree: Option<StoredTreeNode>) -> Self {
        let hash = hex::encode(canonical_hash(&panes, &tree));
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            timestamp: Utc::now(),
            panes,
            tree,
            hash,
        }
    }

    /// Recompute the content hash and compare it to the stored one.
    ///
    /// # Errors
    /// Returns `SnapshotError::HashMismatch` if they differ.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        let recomputed = hex::encode(canonical_hash(&self.panes, &self.tree));
        if recomputed != self.hash {
            return Err(SnapshotError::HashMismatch {
                stored: self.hash.clone(),
                recomputed,
            });
        }
        Ok(())
    }
}

fn canonical_hash(panes: &[StoredPane], tree: &Option<StoredTreeNode>) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update((panes.len() as u32).to_le_bytes());
    for pane in panes {
        hash_pane(&mut hasher, pane);
    }
    hash_tree_node(&mut hasher, tree.as_ref());
    hasher.finalize().to_vec()
}

fn hash_pane(hasher: &mut Sha1, pane: &StoredPane) {
    hash_str(hasher, &pane.id);
    hash_str(hasher, &pane.title);
    hasher.update((pane.rows.len() as u32).to_le_bytes());
    for row in &pane.rows {
        hash_str(hasher, row);
    }
    for field in [pane.x, pane.y, pane.width, pane.height] {
        hasher.update(field.to_le_bytes());
    }
    hash_str(hasher, &pane.app_type);
    hash_str(hasher, &pane.app_config);
}

fn hash_str(hasher: &mut Sha1, s: &str) {
    hasher.update((s.len() as u32).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_tree_node(hasher: &mut Sha1, node: Option<&StoredTreeNode>) {
    let Some(node) = node else {
        hasher.update([0xFFu8]);
        return;
    };
    hasher.update([0u8]);
    hasher.update(node.pane_index.map_or(-1i32, |i| i as i32).to_le_bytes());
    hasher.update([node.split.discriminant()]);
    hasher.update((node.ratios.len() as u16).to_le_bytes());
    for ratio in &node.ratios {
        hasher.update(ratio.to_le_bytes());
    }
    hasher.update((node.children.len() as u16).to_le_bytes());
    for child in &node.children {
        hash_tree_node(hasher, Some(child));
    }
}

/// Convert a runtime `TreeNodeCapture` into its persisted form.
#[must_use]
pub fn to_stored_node(node: &TreeNodeCapture) -> StoredTreeNode {
    StoredTreeNode {
        pane_index: node.pane_index,
        split: node.split,
        ratios: node.split_ratios.clone(),
        children: node.children.iter().map(to_stored_node).collect(),
    }
}

/// Convert a persisted node back into the runtime representation.
#[must_use]
pub fn from_stored_node(node: &StoredTreeNode) -> TreeNodeCapture {
    TreeNodeCapture {
        pane_index: node.pane_index,
        split: node.split,
        split_ratios: node.ratios.clone(),
        children: node.children.iter().map(from_stored_node).collect(),
    }
}

/// Render a `TreeCapture`'s panes into their persisted form, dropping
/// buffer content down to a flat list of row strings the way `TreeSnapshot`
/// frames do (a persisted snapshot restores layout and visible text, not
/// cell-level styling).
#[must_use]
pub fn tree_capture_to_stored_panes(tree: &TreeCapture) -> Vec<StoredPane> {
    tree.panes
        .iter()
        .map(|pane| StoredPane {
            id: pane.id.to_string(),
            title: pane.title.clone(),
            rows: pane
                .buffer
                .iter()
                .map(|row| row.iter().map(|cell| cell.rune).collect())
                .collect(),
            x: pane.rect.x,
            y: pane.rect.y,
            width: pane.rect.w,
            height: pane.rect.h,
            app_type: pane.app_type.clone(),
            app_config: pane.app_config.clone(),
        })
        .collect()
}

/// Parse a `StoredPane`'s hex `id` field back into a `PaneId`.
///
/// # Errors
/// Returns `SnapshotError::InvalidPaneId` if `pane.id` is not valid hex.
pub fn parse_pane_id(pane: &StoredPane) -> Result<PaneId, SnapshotError> {
    PaneId::from_hex(&pane.id).map_err(|_| SnapshotError::InvalidPaneId(pane.id.clone()))
}

/// Durable, file-backed snapshot storage.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot` atomically: serialize to a sibling temp file, flush
    /// and sync it, then rename over the target path. A reader can never
    /// observe a partially written file.
    ///
    /// # Errors
    /// Returns `SnapshotError::Io` on any filesystem failure and
    /// `SnapshotError::Json` if serialization fails.
    pub fn save(&self, snapshot: &StoredSnapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load and verify the snapshot at this store's path.
    ///
    /// # Errors
    /// Returns `SnapshotError::Io` if the file is missing or unreadable,
    /// `SnapshotError::Json` if it is not valid JSON, and
    /// `SnapshotError::HashMismatch` if the content hash does not match.
    pub fn load(&self) -> Result<StoredSnapshot, SnapshotError> {
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Err(SnapshotError::Incomplete);
        }
        let snapshot: StoredSnapshot = serde_json::from_str(&text)?;
        snapshot.verify()?;
        Ok(snapshot)
    }

    /// `true` if a snapshot file exists at this store's path.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
