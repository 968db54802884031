//! Publish scheduler (§4.6): debounces back-to-back pane mutations into a
//! single publish per pane, with a fallback timer so a pane that keeps
//! getting touched is never starved of updates entirely.
//!
//! Each pane gets a single-shot timer of `fallback_delay`, armed by the
//! *first* nudge in a burst. Further nudges while that timer is still
//! running do not push its deadline back — the pane is guaranteed a
//! publish within `fallback_delay` of the first nudge, even if it keeps
//! getting touched faster than that delay (§4.6's "a frame per keystroke"
//! guarantee only holds if the fallback can't be starved by debounce).
//! When the timer fires, `on_fire` is invoked and the pane is considered
//! published. `force_publish` bypasses the timer for cases that must not
//! wait (e.g. the initial `TreeSnapshot` on connect).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::ids::PaneId;

/// Per-pane debounce state.
struct Timer {
    handle: JoinHandle<()>,
    cancel: Arc<Notify>,
}

/// Schedules debounced publish callbacks per pane on a background Tokio
/// runtime. The scheduler itself does not run any async code on the
/// caller's behalf; `nudge` and `force_publish` are synchronous and just
/// arrange for `on_fire` to run later on the runtime passed to `new`.
pub struct Scheduler<F>
where
    F: Fn(PaneId) + Send + Sync + 'static,
{
    handle: tokio::runtime::Handle,
    fallback_delay: Duration,
    timers: Arc<Mutex<HashMap<PaneId, Timer>>>,
    on_fire: Arc<F>,
    nudge_count: Arc<AtomicU64>,
    fallback_count: Arc<AtomicU64>,
}

impl<F> Scheduler<F>
where
    F: Fn(PaneId) + Send + Sync + 'static,
{
    pub fn new(handle: tokio::runtime::Handle, fallback_delay: Duration, on_fire: F) -> Self {
        Self {
            handle,
            fallback_delay,
            timers: Arc::new(Mutex::new(HashMap::new())),
            on_fire: Arc::new(on_fire),
            nudge_count: Arc::new(AtomicU64::new(0)),
            fallback_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Request a publish for `pane`. If a timer is already running for
    /// this pane, it is left alone — the pane is still guaranteed to
    /// publish within `fallback_delay` of whichever nudge armed it.
    /// Otherwise a fresh `fallback_delay` timer is started.
    pub fn nudge(&self, pane: PaneId) {
        let mut timers = self.timers.lock();
        self.nudge_count.fetch_add(1, Ordering::Relaxed);
        if timers.contains_key(&pane) {
            return;
        }
        let cancel = Arc::new(Notify::new());
        let cancel_for_task = Arc::clone(&cancel);
        let delay = self.fallback_delay;
        let on_fire = Arc::clone(&self.on_fire);
        let timers_for_task = Arc::clone(&self.timers);
        let fallback_count = Arc::clone(&self.fallback_count);
        let handle = self.handle.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    timers_for_task.lock().remove(&pane);
                    fallback_count.fetch_add(1, Ordering::Relaxed);
                    on_fire(pane);
                }
                () = cancel_for_task.notified() => {}
            }
        });
        timers.insert(pane, Timer { handle, cancel });
    }

    /// Publish `pane` immediately, cancelling any pending debounce timer
    /// for it.
    pub fn force_publish(&self, pane: PaneId) {
        if let Some(existing) = self.timers.lock().remove(&pane) {
            existing.cancel.notify_one();
            existing.handle.abort();
        }
        (self.on_fire)(pane);
    }

    /// Cancel any pending timer for `pane` without publishing.
    pub fn cancel(&self, pane: PaneId) {
        if let Some(existing) = self.timers.lock().remove(&pane) {
            existing.cancel.notify_one();
            existing.handle.abort();
        }
    }

    #[must_use]
    pub fn has_pending(&self, pane: PaneId) -> bool {
        self.timers.lock().contains_key(&pane)
    }

    /// Number of times `nudge` was called — a proxy metric for how often
    /// the scheduler is being asked to debounce, used by tests to assert
    /// on debounce behavior without racing real timers.
    #[must_use]
    pub fn arm_count(&self) -> u64 {
        self.nudge_count.load(Ordering::Relaxed)
    }

    /// Number of times a fallback timer actually expired and fired
    /// `on_fire` (§4.6, §8 scenario 5's `fallbackCount`), as distinct from
    /// `arm_count`, which counts every nudge regardless of whether it
    /// started a new timer.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }
}
