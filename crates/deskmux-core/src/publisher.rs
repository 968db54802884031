//! Desktop publisher (§4.5): turns the desktop engine's raw buffer state
//! into `BufferDelta` frames, diffing against the previous published frame
//! per pane and interning styles so repeated runs of identically-styled
//! text cost one style-table entry instead of one per cell.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::ids::PaneId;
use crate::model::{BufferDelta, Cell, CellSpan, RowDelta, Style, StyleEntry, buffer_delta_flag};

#[derive(Debug, Clone, Default)]
struct PaneFrame {
    rows: Vec<Vec<Cell>>,
    revision: u32,
    dirty: bool,
}

/// Tracks, per pane, the last-published frame and whether it needs
/// republishing; produces `BufferDelta`s against that frame on `publish`.
#[derive(Default)]
pub struct Publisher {
    frames: Mutex<HashMap<PaneId, PaneFrame>>,
}

impl Publisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pane dirty without changing its tracked frame — used when an
    /// external event (desktop-raised `PaneBufferChanged`) indicates a
    /// republish is owed even though this publisher hasn't seen the new
    /// content yet.
    pub fn mark_pane_dirty(&self, pane: PaneId) {
        self.frames.lock().entry(pane).or_default().dirty = true;
    }

    pub fn mark_all_dirty(&self) {
        for frame in self.frames.lock().values_mut() {
            frame.dirty = true;
        }
    }

    /// Forget everything tracked for `pane`; the next `publish` call for
    /// it produces a full-content delta (§3 "BufferDelta" `FULL_CONTENT`
    /// flag) rather than a diff against stale state. Used on session
    /// resume, where the new client has no prior frame to diff against.
    pub fn reset_diff_state(&self, pane: PaneId) {
        self.frames.lock().remove(&pane);
    }

    #[must_use]
    pub fn is_dirty(&self, pane: PaneId) -> bool {
        self.frames.lock().get(&pane).is_some_and(|f| f.dirty)
    }

    /// Diff `rows` against the last-published frame for `pane` and return
    /// the resulting delta. Always clears the dirty flag and advances the
    /// pane's revision counter, even if the diff turns out empty (no rows
    /// changed) — callers decide whether an empty delta is worth sending.
    pub fn publish(&self, pane: PaneId, rows: &[Vec<Cell>]) -> BufferDelta {
        let mut frames = self.frames.lock();
        let entry = frames.entry(pane).or_default();
        let is_first_publish = entry.rows.is_empty() && entry.revision == 0;

        let mut style_table: Vec<StyleEntry> = Vec::new();
        let mut style_index: HashMap<Style, u32> = HashMap::new();
        let mut row_deltas = Vec::new();

        for (row_index, row) in rows.iter().enumerate() {
            let changed = if is_first_publish {
                true
            } else {
                entry.rows.get(row_index).is_none_or(|prev| prev != row)
            };
            if !changed {
                continue;
            }
            let spans = build_spans(row, &mut style_table, &mut style_index);
            if spans.is_empty() {
                continue;
            }
            row_deltas.push(RowDelta {
                row_index: row_index as u32,
                spans,
            });
        }

        entry.revision += 1;
        let flags = if is_first_publish { buffer_delta_flag::FULL_CONTENT } else { 0 };
        entry.rows = rows.to_vec();
        entry.dirty = false;
        let revision = entry.revision;

        BufferDelta {
            pane_id: pane,
            revision,
            flags,
            style_table,
            row_deltas,
        }
    }
}

fn build_spans(
    row: &[Cell],
    style_table: &mut Vec<StyleEntry>,
    style_index: &mut HashMap<Style, u32>,
) -> Vec<CellSpan> {
    let mut spans = Vec::new();
    let mut current: Option<(u32, u32, String)> = None; // (start_col, style_idx, text)

    for (col, cell) in row.iter().enumerate() {
        let idx = *style_index.entry(cell.style).or_insert_with(|| {
            style_table.push(cell.style);
            (style_table.len() - 1) as u32
        });
        match &mut current {
            Some((_, cur_idx, text)) if *cur_idx == idx => text.push(cell.rune),
            _ => {
                if let Some((start, idx, text)) = current.take() {
                    spans.push(CellSpan { start_col: start, style_index: idx, text });
                }
                current = Some((col as u32, idx, cell.rune.to_string()));
            }
        }
    }
    if let Some((start, idx, text)) = current {
        spans.push(CellSpan { start_col: start, style_index: idx, text });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, attr};

    fn row(text: &str, style: Style) -> Vec<Cell> {
        text.chars().map(|rune| Cell { rune, style }).collect()
    }

    #[test]
    fn first_publish_is_full_content() {
        let publisher = Publisher::new();
        let delta = publisher.publish(PaneId::from_u128(1), &[row("hi", Style::default())]);
        assert_eq!(delta.flags & buffer_delta_flag::FULL_CONTENT, buffer_delta_flag::FULL_CONTENT);
        assert_eq!(delta.row_deltas.len(), 1);
    }

    #[test]
    fn unchanged_content_produces_empty_delta() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        publisher.publish(pane, &[row("hi", Style::default())]);
        let delta = publisher.publish(pane, &[row("hi", Style::default())]);
        assert!(delta.row_deltas.is_empty());
        assert_eq!(delta.flags & buffer_delta_flag::FULL_CONTENT, 0);
    }

    #[test]
    fn changed_row_is_included_unchanged_row_is_not() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        publisher.publish(pane, &[row("aaa", Style::default()), row("bbb", Style::default())]);
        let delta = publisher.publish(pane, &[row("aaa", Style::default()), row("ccc", Style::default())]);
        assert_eq!(delta.row_deltas.len(), 1);
        assert_eq!(delta.row_deltas[0].row_index, 1);
    }

    #[test]
    fn style_table_interns_repeated_styles() {
        let publisher = Publisher::new();
        let bold = Style { attr_flags: attr::BOLD, fg: Color::default_color(), bg: Color::default_color() };
        let delta = publisher.publish(PaneId::from_u128(1), &[row("aabb", bold)]);
        // every char shares the same style, so one run, one style entry
        assert_eq!(delta.style_table.len(), 1);
        assert_eq!(delta.row_deltas[0].spans.len(), 1);
        assert_eq!(delta.row_deltas[0].spans[0].text, "aabb");
    }

    #[test]
    fn style_change_mid_row_splits_into_spans() {
        let publisher = Publisher::new();
        let plain = Style::default();
        let bold = Style { attr_flags: attr::BOLD, ..Style::default() };
        let mut cells = row("aa", plain);
        cells.extend(row("bb", bold));
        let delta = publisher.publish(PaneId::from_u128(1), &[cells]);
        assert_eq!(delta.row_deltas[0].spans.len(), 2);
        assert_eq!(delta.style_table.len(), 2);
    }

    #[test]
    fn revision_increments_on_every_publish() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        let d1 = publisher.publish(pane, &[row("a", Style::default())]);
        let d2 = publisher.publish(pane, &[row("a", Style::default())]);
        assert_eq!(d2.revision, d1.revision + 1);
    }

    #[test]
    fn reset_diff_state_forces_full_content_again() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        publisher.publish(pane, &[row("hi", Style::default())]);
        publisher.reset_diff_state(pane);
        let delta = publisher.publish(pane, &[row("hi", Style::default())]);
        assert_eq!(delta.flags & buffer_delta_flag::FULL_CONTENT, buffer_delta_flag::FULL_CONTENT);
    }

    #[test]
    fn mark_pane_dirty_is_observable() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        assert!(!publisher.is_dirty(pane));
        publisher.mark_pane_dirty(pane);
        assert!(publisher.is_dirty(pane));
        publisher.publish(pane, &[row("a", Style::default())]);
        assert!(!publisher.is_dirty(pane));
    }

    #[test]
    fn mark_all_dirty_sets_every_tracked_pane() {
        let publisher = Publisher::new();
        let a = PaneId::from_u128(1);
        let b = PaneId::from_u128(2);
        publisher.publish(a, &[row("a", Style::default())]);
        publisher.publish(b, &[row("b", Style::default())]);
        publisher.mark_all_dirty();
        assert!(publisher.is_dirty(a));
        assert!(publisher.is_dirty(b));
    }

    #[test]
    fn first_publish_of_an_empty_row_produces_no_row_delta() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        let delta = publisher.publish(pane, &[Vec::new()]);
        assert!(delta.row_deltas.is_empty());
    }

    #[test]
    fn shrinking_row_count_only_redescribes_changed_rows() {
        let publisher = Publisher::new();
        let pane = PaneId::from_u128(1);
        publisher.publish(pane, &[row("a", Style::default()), row("b", Style::default())]);
        let delta = publisher.publish(pane, &[row("a", Style::default())]);
        assert!(delta.row_deltas.is_empty());
    }
}
