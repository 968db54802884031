//! Desktop sink (§4.7): the adapter between a connection's inbound
//! messages and the desktop engine, and between the desktop engine's
//! outbound state and the publisher/session queue.
//!
//! `Sink` owns no network I/O; `Connection` calls into it for every
//! client-originated event, and polls it (via `publish`/`publish_all`) to
//! get `BufferDelta`/`PaneState`/`StateUpdate` frames ready to enqueue.

use std::sync::Arc;

use crate::desktop::{DesktopEngine, DesktopEvent, DesktopStatePayload, KeyEvent, MouseEvent};
use crate::ids::PaneId;
use crate::model::{BufferDelta, PaneState};
use crate::publisher::Publisher;

/// Routes client input to a `DesktopEngine` and desktop output through a
/// `Publisher`.
pub struct Sink {
    engine: Arc<dyn DesktopEngine>,
    publisher: Publisher,
}

impl Sink {
    #[must_use]
    pub fn new(engine: Arc<dyn DesktopEngine>) -> Self {
        Self {
            engine,
            publisher: Publisher::new(),
        }
    }

    pub fn handle_key_event(&self, pane: PaneId, event: KeyEvent) {
        self.engine.inject_key_event(pane, event);
    }

    pub fn handle_mouse_event(&self, pane: PaneId, event: MouseEvent) {
        self.engine.inject_mouse_event(pane, event);
    }

    pub fn handle_paste(&self, pane: PaneId, data: &str) {
        self.engine.handle_paste(pane, data);
    }

    pub fn handle_clipboard_set(&self, data: &str) {
        self.engine.handle_clipboard_set(data);
    }

    #[must_use]
    pub fn handle_clipboard_get(&self) -> String {
        self.engine.handle_clipboard_get()
    }

    pub fn handle_theme_update(&self, theme_json: &str) {
        self.engine.handle_theme_update(theme_json);
    }

    pub fn handle_resize(&self, pane: PaneId, cols: i32, rows: i32) {
        self.engine.set_viewport_size(pane, cols, rows);
    }

    /// Diff and publish one pane's current buffer content.
    #[must_use]
    pub fn publish(&self, pane: PaneId) -> Option<BufferDelta> {
        let snapshot = self
            .engine
            .snapshot_buffers()
            .into_iter()
            .find(|p| p.id == pane)?;
        Some(self.publisher.publish(pane, &snapshot.buffer))
    }

    /// Diff and publish every currently live pane, skipping any whose
    /// delta carries no row changes.
    #[must_use]
    pub fn publish_all(&self) -> Vec<BufferDelta> {
        self.engine
            .snapshot_buffers()
            .into_iter()
            .map(|pane| self.publisher.publish(pane.id, &pane.buffer))
            .filter(|delta| !delta.row_deltas.is_empty() || delta.flags != 0)
            .collect()
    }

    /// Drain desktop-raised events (tree changes, buffer/state changes on
    /// panes the connection didn't directly touch) since the last call.
    pub fn drain_events(&self) -> Vec<DesktopEvent> {
        self.engine.drain_events()
    }

    #[must_use]
    pub fn active_pane_id(&self) -> Option<PaneId> {
        self.engine.active_pane_id()
    }

    #[must_use]
    pub fn pane_states(&self) -> Vec<(PaneId, PaneState)> {
        self.engine.pane_states()
    }

    #[must_use]
    pub fn current_state_payload(&self) -> DesktopStatePayload {
        self.engine.current_state_payload()
    }

    #[must_use]
    pub fn capture_tree(&self) -> crate::model::TreeCapture {
        self.engine.capture_tree()
    }

    pub fn apply_tree_capture(&self, capture: &crate::model::TreeCapture) {
        self.engine.apply_tree_capture(capture);
    }

    /// Forget diff state for `pane`, forcing the next `publish` to emit a
    /// full-content delta — used when a resuming client has no prior
    /// frame to diff against.
    pub fn reset_diff_state(&self, pane: PaneId) {
        self.publisher.reset_diff_state(pane);
    }

    pub fn mark_all_dirty(&self) {
        self.publisher.mark_all_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::fake::FakeDesktop;

    fn sink_with_fake() -> (Sink, Arc<FakeDesktop>) {
        let fake = Arc::new(FakeDesktop::new(PaneId::from_u128(1), "shell"));
        let sink = Sink::new(Arc::clone(&fake) as Arc<dyn DesktopEngine>);
        (sink, fake)
    }

    #[test]
    fn key_event_is_forwarded_to_engine() {
        let (sink, fake) = sink_with_fake();
        let event = KeyEvent { key_code: 1, rune_value: -1, modifiers: 0 };
        sink.handle_key_event(PaneId::from_u128(1), event);
        assert_eq!(fake.last_key_event(), Some(event));
    }

    #[test]
    fn paste_is_forwarded_to_engine() {
        let (sink, fake) = sink_with_fake();
        sink.handle_paste(PaneId::from_u128(1), "pasted");
        assert_eq!(fake.last_paste(), Some("pasted".to_string()));
    }

    #[test]
    fn clipboard_round_trips_through_sink() {
        let (sink, _fake) = sink_with_fake();
        sink.handle_clipboard_set("copied");
        assert_eq!(sink.handle_clipboard_get(), "copied");
    }

    #[test]
    fn theme_update_is_forwarded() {
        let (sink, fake) = sink_with_fake();
        sink.handle_theme_update("{\"bg\":\"#000\"}");
        assert_eq!(fake.theme_json(), "{\"bg\":\"#000\"}");
    }

    #[test]
    fn first_publish_is_full_content() {
        let (sink, _fake) = sink_with_fake();
        let delta = sink.publish(PaneId::from_u128(1)).unwrap();
        assert_ne!(delta.flags, 0);
    }

    #[test]
    fn publish_all_only_returns_changed_panes() {
        let (sink, fake) = sink_with_fake();
        let first = sink.publish_all();
        assert_eq!(first.len(), 1); // first publish is always full content
        let second = sink.publish_all();
        assert!(second.is_empty());
        fake.set_row_text(0, "changed");
        let third = sink.publish_all();
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn publish_unknown_pane_returns_none() {
        let (sink, _fake) = sink_with_fake();
        assert!(sink.publish(PaneId::from_u128(999)).is_none());
    }

    #[test]
    fn reset_diff_state_forces_full_republish() {
        let (sink, _fake) = sink_with_fake();
        sink.publish(PaneId::from_u128(1));
        sink.reset_diff_state(PaneId::from_u128(1));
        let delta = sink.publish(PaneId::from_u128(1)).unwrap();
        assert_ne!(delta.flags, 0);
    }
}
