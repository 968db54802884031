//! A minimal, real-but-trivial `DesktopEngine`.
//!
//! The actual pane tree — PTY management, app lifecycle, workspace
//! switching — is an external collaborator this crate never implements
//! (`deskmux-core::desktop` consumes `DesktopEngine`, it doesn't provide
//! one). This module exists so `deskmuxd` is runnable standalone: a single
//! pane showing a static banner, with no process behind it. A real
//! deployment links a real engine in and constructs `Server::new` with that
//! instead.

use std::sync::Mutex;

use deskmux_core::desktop::{DesktopEngine, DesktopEvent, DesktopStatePayload, KeyEvent, MouseEvent};
use deskmux_core::model::{Cell, PaneSnapshot, PaneState, Rect, Split, Style, TreeCapture, TreeNodeCapture};
use deskmux_core::PaneId;

struct State {
    pane_id: PaneId,
    title: String,
    rows: Vec<Vec<Cell>>,
    cols: i32,
    clipboard: String,
    theme_json: String,
    events: Vec<DesktopEvent>,
}

fn banner_rows(cols: i32) -> Vec<Vec<Cell>> {
    ["deskmuxd", "", "no desktop engine attached — showing a static banner"]
        .iter()
        .map(|line| {
            let mut row: Vec<Cell> = line.chars().map(|rune| Cell { rune, style: Style::default() }).collect();
            row.truncate(cols.max(0) as usize);
            row
        })
        .collect()
}

/// Single-pane, single-workspace placeholder engine.
pub struct PlaceholderDesktop {
    state: Mutex<State>,
}

impl PlaceholderDesktop {
    #[must_use]
    pub fn new() -> Self {
        let pane_id = PaneId::from_u128(1);
        let cols = 80;
        Self {
            state: Mutex::new(State {
                pane_id,
                title: "deskmuxd".to_string(),
                rows: banner_rows(cols),
                cols,
                clipboard: String::new(),
                theme_json: String::new(),
                events: Vec::new(),
            }),
        }
    }
}

impl Default for PlaceholderDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopEngine for PlaceholderDesktop {
    fn capture_tree(&self) -> TreeCapture {
        let state = self.state.lock().unwrap();
        TreeCapture {
            panes: vec![PaneSnapshot {
                id: state.pane_id,
                title: state.title.clone(),
                buffer: state.rows.clone(),
                rect: Rect { x: 0, y: 0, w: state.cols, h: state.rows.len() as i32 },
                app_type: "placeholder".into(),
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

    fn set_viewport_size(&self, _pane: PaneId, cols: i32, _rows: i32) {
        let mut state = self.state.lock().unwrap();
        state.cols = cols;
        state.rows = banner_rows(cols);
        state.events.push(DesktopEvent::PaneBufferChanged(state.pane_id));
    }

    fn inject_key_event(&self, _pane: PaneId, _event: KeyEvent) {}

    fn inject_mouse_event(&self, _pane: PaneId, _event: MouseEvent) {}

    fn handle_clipboard_set(&self, data: &str) {
        self.state.lock().unwrap().clipboard = data.to_string();
    }

    fn handle_clipboard_get(&self) -> String {
        self.state.lock().unwrap().clipboard.clone()
    }

    fn handle_theme_update(&self, theme_json: &str) {
        self.state.lock().unwrap().theme_json = theme_json.to_string();
    }

    fn handle_paste(&self, _pane: PaneId, _data: &str) {}

    fn active_pane_id(&self) -> Option<PaneId> {
        Some(self.state.lock().unwrap().pane_id)
    }

    fn pane_states(&self) -> Vec<(PaneId, PaneState)> {
        let state = self.state.lock().unwrap();
        vec![(state.pane_id, PaneState { active: true, resizing: false, z_order: 0, handles_selection: false })]
    }

    fn current_state_payload(&self) -> DesktopStatePayload {
        let state = self.state.lock().unwrap();
        DesktopStatePayload {
            active_workspace_id: 0,
            all_workspaces: vec![0],
            in_control_mode: false,
            sub_mode: String::new(),
            active_title: state.title.clone(),
            desktop_bg_rgb: 0,
        }
    }

    fn drain_events(&self) -> Vec<DesktopEvent> {
        std::mem::take(&mut self.state.lock().unwrap().events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_pane_and_a_banner() {
        let engine = PlaceholderDesktop::new();
        let tree = engine.capture_tree();
        assert_eq!(tree.panes.len(), 1);
        assert_eq!(tree.panes[0].buffer[0].iter().map(|c| c.rune).collect::<String>(), "deskmuxd");
    }

    #[test]
    fn resize_redraws_the_banner_at_the_new_width() {
        let engine = PlaceholderDesktop::new();
        engine.set_viewport_size(PaneId::from_u128(1), 10, 24);
        let tree = engine.capture_tree();
        assert_eq!(tree.panes[0].rect.w, 10);
        assert!(!engine.drain_events().is_empty());
    }

    #[test]
    fn clipboard_round_trips() {
        let engine = PlaceholderDesktop::new();
        engine.handle_clipboard_set("hi");
        assert_eq!(engine.handle_clipboard_get(), "hi");
    }
}
