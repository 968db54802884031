//! Shared data-model types from §3: the pane/tree capture the desktop hands
//! back, the diff format the publisher emits, and the style table the diff
//! format interns against. These are pure data — no I/O, no locking — so
//! `codec`, `desktop`, `publisher`, and `snapshot` can all depend on them
//! without creating a cycle.

use serde::{Deserialize, Serialize};

use crate::ids::PaneId;

/// How a tree node's children are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    None,
    Vertical,
    Horizontal,
}

impl Split {
    #[must_use]
    pub const fn discriminant(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Vertical => 1,
            Self::Horizontal => 2,
        }
    }

    #[must_use]
    pub const fn from_discriminant(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Vertical),
            2 => Some(Self::Horizontal),
            _ => None,
        }
    }
}

/// A rectangle in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// One cell's visual attributes, canonicalized into the 5-tuple the spec
/// names for style-key comparison: `(flags, fg_model, fg_value, bg_model,
/// bg_value)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Style {
    pub attr_flags: u8,
    pub fg: Color,
    pub bg: Color,
}

/// Attribute flag bits for `Style::attr_flags`.
pub mod attr {
    pub const BOLD: u8 = 1 << 0;
    pub const UNDERLINE: u8 = 1 << 1;
    pub const REVERSE: u8 = 1 << 2;
    pub const BLINK: u8 = 1 << 3;
    pub const DIM: u8 = 1 << 4;
    pub const ITALIC: u8 = 1 << 5;
}

/// A color in either the default (terminal-chosen) model or true RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Color {
    pub model: ColorModel,
    /// `0x00RRGGBB` when `model == Rgb`; ignored (encoded as 0) otherwise.
    pub value: u32,
}

impl Color {
    #[must_use]
    pub const fn default_color() -> Self {
        Self {
            model: ColorModel::Default,
            value: 0,
        }
    }

    #[must_use]
    pub const fn rgb(value: u32) -> Self {
        Self {
            model: ColorModel::Rgb,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    #[default]
    Default,
    Rgb,
}

/// An interned, de-duplicated style table entry (§3 "StyleEntry").
pub type StyleEntry = Style;

/// One character cell: a Unicode scalar value plus its style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub rune: char,
    pub style: Style,
}

/// A contiguous run of cells sharing one style, within a single row (§3
/// "CellSpan").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSpan {
    pub start_col: u32,
    /// Index into the enclosing `BufferDelta::style_table`.
    pub style_index: u32,
    pub text: String,
}

/// The spans that changed within one row (§3 "RowDelta").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDelta {
    pub row_index: u32,
    pub spans: Vec<CellSpan>,
}

/// Flag bits carried on a `BufferDelta` frame's `flags` byte.
pub mod buffer_delta_flag {
    /// This delta represents the full (initial) content of the pane, i.e.
    /// it was emitted after `ResetDiffState`.
    pub const FULL_CONTENT: u8 = 1 << 0;
}

/// The minimal set of row updates that transforms a client's last-known
/// pane state into the server's current state (§3 "BufferDelta").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDelta {
    pub pane_id: PaneId,
    pub revision: u32,
    pub flags: u8,
    pub style_table: Vec<StyleEntry>,
    pub row_deltas: Vec<RowDelta>,
}

/// Per-pane active/resizing/z-order/selection state (§3 "PaneState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaneState {
    pub active: bool,
    pub resizing: bool,
    pub z_order: i32,
    pub handles_selection: bool,
}

pub mod pane_state_flag {
    pub const ACTIVE: u8 = 1 << 0;
    pub const RESIZING: u8 = 1 << 1;
    pub const HANDLES_SELECTION: u8 = 1 << 2;
}

impl PaneState {
    #[must_use]
    pub const fn to_flags(self) -> u8 {
        let mut flags = 0u8;
        if self.active {
            flags |= pane_state_flag::ACTIVE;
        }
        if self.resizing {
            flags |= pane_state_flag::RESIZING;
        }
        if self.handles_selection {
            flags |= pane_state_flag::HANDLES_SELECTION;
        }
        flags
    }

    #[must_use]
    pub const fn from_flags(flags: u8, z_order: i32) -> Self {
        Self {
            active: flags & pane_state_flag::ACTIVE != 0,
            resizing: flags & pane_state_flag::RESIZING != 0,
            z_order,
            handles_selection: flags & pane_state_flag::HANDLES_SELECTION != 0,
        }
    }
}

/// A full pane capture as handed back by the desktop engine (§3
/// "`TreeCapture`/`PaneSnapshot`").
#[derive(Debug, Clone, PartialEq)]
pub struct PaneSnapshot {
    pub id: PaneId,
    pub title: String,
    /// 2-D buffer of cells, outer index is row, inner index is column.
    pub buffer: Vec<Vec<Cell>>,
    pub rect: Rect,
    pub app_type: String,
    /// Opaque, untyped app configuration — carried as a JSON-encoded
    /// string at every boundary, never parsed by the core (§9).
    pub app_config: String,
}

/// A node in the pane split tree: either an internal split node (whose
/// `pane_index` is `None`) or a leaf pointing at a pane (§3
/// "`TreeNodeCapture`").
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNodeCapture {
    pub pane_index: Option<usize>,
    pub split: Split,
    pub split_ratios: Vec<f64>,
    pub children: Vec<TreeNodeCapture>,
}

/// A complete, serializable description of the pane tree (§3 "TreeCapture").
#[derive(Debug, Clone, PartialEq)]
pub struct TreeCapture {
    pub panes: Vec<PaneSnapshot>,
    pub root: Option<TreeNodeCapture>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_discriminant_round_trips() {
        for split in [Split::None, Split::Vertical, Split::Horizontal] {
            assert_eq!(Split::from_discriminant(split.discriminant()), Some(split));
        }
    }

    #[test]
    fn split_unknown_discriminant_is_none() {
        assert_eq!(Split::from_discriminant(200), None);
    }

    #[test]
    fn pane_state_flags_round_trip() {
        let state = PaneState {
            active: true,
            resizing: false,
            z_order: 3,
            handles_selection: true,
        };
        let flags = state.to_flags();
        let restored = PaneState::from_flags(flags, state.z_order);
        assert_eq!(restored, state);
    }

    #[test]
    fn default_color_has_zero_value() {
        let c = Color::default_color();
        assert_eq!(c.model, ColorModel::Default);
        assert_eq!(c.value, 0);
    }
}
