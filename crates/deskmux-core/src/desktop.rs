//! The desktop engine interface (§6 "desktop-engine, consumed not
//! implemented").
//!
//! `deskmux-core` never renders a terminal or runs a shell itself; it
//! multiplexes *some* implementation of a pane tree to remote clients. That
//! implementation lives outside this crate and is reached only through the
//! `DesktopEngine` trait below. Production wiring supplies a real engine;
//! this module also ships an in-memory fake used by the rest of the crate's
//! test suite (`connection`, `publisher`, `sink`, `scheduler`).

use crate::ids::PaneId;
use crate::model::{PaneSnapshot, PaneState, TreeCapture};

/// A key press or release, as forwarded from a client's `KeyEvent` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: u32,
    pub rune_value: i32,
    pub modifiers: u16,
}

/// A mouse action, as forwarded from a client's `MouseEvent` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: i32,
    pub y: i32,
    pub button_mask: u32,
    pub modifiers: u16,
}

/// Everything a client can currently observe about workspace/control-mode
/// state (§3, §6 "StateUpdate").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopStatePayload {
    pub active_workspace_id: i32,
    pub all_workspaces: Vec<i32>,
    pub in_control_mode: bool,
    /// Opaque passthrough string — never interpreted by the core (§9
    /// resolved Open Question: `StateUpdate.subMode` is forwarded verbatim).
    pub sub_mode: String,
    pub active_title: String,
    pub desktop_bg_rgb: u32,
}

/// A kind of desktop-level event the engine can raise asynchronously
/// (independent of a client request) that the sink must react to by
/// re-publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopEvent {
    /// The pane tree shape or membership changed.
    TreeChanged,
    /// A pane's buffer content changed.
    PaneBufferChanged(PaneId),
    /// A pane's active/resizing/z-order/selection state changed.
    PaneStateChanged(PaneId),
}

/// The interface `deskmux-core` consumes to drive an actual terminal
/// desktop. Implementations are expected to be internally synchronized;
/// every method here may be called from any connection's thread.
pub trait DesktopEngine: Send + Sync {
    /// Capture the full pane tree: every pane's rect/title/app metadata,
    /// and the split-tree topology relating them.
    fn capture_tree(&self) -> TreeCapture;

    /// Capture the current buffer contents of every pane — used by the
    /// publisher to diff against the previous frame.
    fn snapshot_buffers(&self) -> Vec<PaneSnapshot>;

    /// Restore a previously captured tree (used when loading a persisted
    /// snapshot at startup).
    fn apply_tree_capture(&self, capture: &TreeCapture);

    /// Resize a pane's viewport.
    fn set_viewport_size(&self, pane: PaneId, cols: i32, rows: i32);

    fn inject_key_event(&self, pane: PaneId, event: KeyEvent);

    fn inject_mouse_event(&self, pane: PaneId, event: MouseEvent);

    fn handle_clipboard_set(&self, data: &str);

    fn handle_clipboard_get(&self) -> String;

    fn handle_theme_update(&self, theme_json: &str);

    fn handle_paste(&self, pane: PaneId, data: &str);

    /// The pane currently considered focused, if any.
    fn active_pane_id(&self) -> Option<PaneId>;

    /// Active/resizing/z-order/selection state for every live pane.
    fn pane_states(&self) -> Vec<(PaneId, PaneState)>;

    /// A full snapshot of workspace/control-mode state for `StateUpdate`.
    fn current_state_payload(&self) -> DesktopStatePayload;

    /// Drain any desktop-raised events since the last call. Implementations
    /// that have nothing to report return an empty vec; this is polled by
    /// the publish scheduler's fallback timer rather than pushed, to avoid
    /// needing a callback registration API here.
    fn drain_events(&self) -> Vec<DesktopEvent>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! A deterministic, in-memory `DesktopEngine` used by tests elsewhere
    //! in this crate. Single pane, single row, no real split tree — just
    //! enough state to exercise publish/diff/connection logic without a
    //! real terminal backend.

    use std::sync::Mutex;

    use super::{DesktopEngine, DesktopEvent, DesktopStatePayload, KeyEvent, MouseEvent};
    use crate::ids::PaneId;
    use crate::model::{Cell, PaneSnapshot, PaneState, Rect, Split, Style, TreeCapture, TreeNodeCapture};

    #[derive(Debug, Default)]
    struct State {
        pane_id: PaneId,
        title: String,
        rows: Vec<Vec<Cell>>,
        active: bool,
        clipboard: String,
        theme_json: String,
        events: Vec<DesktopEvent>,
        last_key: Option<KeyEvent>,
        last_mouse: Option<MouseEvent>,
        last_paste: Option<String>,
    }

    /// An in-memory single-pane desktop, for unit and integration tests.
    pub struct FakeDesktop {
        state: Mutex<State>,
    }

    impl FakeDesktop {
        #[must_use]
        pub fn new(pane_id: PaneId, title: impl Into<String>) -> Self {
            Self {
                state: Mutex::new(State {
                    pane_id,
                    title: title.into(),
                    rows: vec![Vec::new()],
                    active: true,
                    ..Default::default()
                }),
            }
        }

        /// Replace row 0 with the given text, each char default-styled.
        pub fn set_row_text(&self, row: usize, text: &str) {
            let mut state = self.state.lock().unwrap();
            while state.rows.len() <= row {
                state.rows.push(Vec::new());
            }
            state.rows[row] = text
                .chars()
                .map(|rune| Cell { rune, style: Style::default() })
                .collect();
            state.events.push(DesktopEvent::PaneBufferChanged(state.pane_id));
        }

        pub fn push_event(&self, event: DesktopEvent) {
            self.state.lock().unwrap().events.push(event);
        }

        #[must_use]
        pub fn last_key_event(&self) -> Option<KeyEvent> {
            self.state.lock().unwrap().last_key
        }

        #[must_use]
        pub fn last_mouse_event(&self) -> Option<MouseEvent> {
            self.state.lock().unwrap().last_mouse
        }

        #[must_use]
        pub fn last_paste(&self) -> Option<String> {
            self.state.lock().unwrap().last_paste.clone()
        }

        #[must_use]
        pub fn theme_json(&self) -> String {
            self.state.lock().unwrap().theme_json.clone()
        }
    }

    impl DesktopEngine for FakeDesktop {
        fn capture_tree(&self) -> TreeCapture {
            let state = self.state.lock().unwrap();
            TreeCapture {
                panes: vec![PaneSnapshot {
                    id: state.pane_id,
                    title: state.title.clone(),
                    buffer: state.rows.clone(),
                    rect: Rect { x: 0, y: 0, w: 80, h: state.rows.len() as i32 },
                    app_type: "shell".into(),
                    app_config: "{}".into(),
                }],
                root: Some(TreeNodeCapture {
                    pane_index: Some(0),
                    split: Split::None,
                    split_ratios: vec![],
                    children: vec![],
                }),
            }
        }

        fn snapshot_buffers(&self) -> Vec<PaneSnapshot> {
            self.capture_tree().panes
        }

        fn apply_tree_capture(&self, capture: &TreeCapture) {
            let mut state = self.state.lock().unwrap();
            if let Some(pane) = capture.panes.first() {
                state.pane_id = pane.id;
                state.title = pane.title.clone();
                state.rows = pane.buffer.clone();
            }
        }

        fn set_viewport_size(&self, _pane: PaneId, _cols: i32, _rows: i32) {}

        fn inject_key_event(&self, _pane: PaneId, event: KeyEvent) {
            self.state.lock().unwrap().last_key = Some(event);
        }

        fn inject_mouse_event(&self, _pane: PaneId, event: MouseEvent) {
            self.state.lock().unwrap().last_mouse = Some(event);
        }

        fn handle_clipboard_set(&self, data: &str) {
            self.state.lock().unwrap().clipboard = data.to_string();
        }

        fn handle_clipboard_get(&self) -> String {
            self.state.lock().unwrap().clipboard.clone()
        }

        fn handle_theme_update(&self, theme_json: &str) {
            self.state.lock().unwrap().theme_json = theme_json.to_string();
        }

        fn handle_paste(&self, _pane: PaneId, data: &str) {
            self.state.lock().unwrap().last_paste = Some(data.to_string());
        }

        fn active_pane_id(&self) -> Option<PaneId> {
            let state = self.state.lock().unwrap();
            state.active.then_some(state.pane_id)
        }

        fn pane_states(&self) -> Vec<(PaneId, PaneState)> {
            let state = self.state.lock().unwrap();
            vec![(
                state.pane_id,
                PaneState { active: state.active, resizing: false, z_order: 0, handles_selection: true },
            )]
        }

        fn current_state_payload(&self) -> DesktopStatePayload {
            DesktopStatePayload {
                active_workspace_id: 0,
                all_workspaces: vec![0],
                in_control_mode: false,
                sub_mode: String::new(),
                active_title: self.state.lock().unwrap().title.clone(),
                desktop_bg_rgb: 0,
            }
        }

        fn drain_events(&self) -> Vec<DesktopEvent> {
            std::mem::take(&mut self.state.lock().unwrap().events)
        }
    }

}
