//! Click debounce and single in-flight request guard for the UI glue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Repeated clicks on one node inside this window expand it once.
pub const CLICK_WINDOW: Duration = Duration::from_millis(300);

pub fn should_trigger_expand(
    last_click_id: Option<&str>,
    last_click_time: Option<Instant>,
    new_click_id: &str,
    now: Instant,
) -> bool {
    should_trigger_expand_within(last_click_id, last_click_time, new_click_id, now, CLICK_WINDOW)
}

pub fn should_trigger_expand_within(
    last_click_id: Option<&str>,
    last_click_time: Option<Instant>,
    new_click_id: &str,
    now: Instant,
    window: Duration,
) -> bool {
    match (last_click_id, last_click_time) {
        (Some(last_id), Some(last_time)) if last_id == new_click_id => {
            now.saturating_duration_since(last_time) >= window
        }
        _ => true,
    }
}

/// Last click seen by one client.
#[derive(Debug, Clone)]
pub struct ClickTracker {
    last: Option<(String, Instant)>,
    window: Duration,
}

impl Default for ClickTracker {
    fn default() -> Self {
        Self::new(CLICK_WINDOW)
    }
}

impl ClickTracker {
    pub fn new(window: Duration) -> Self {
        Self { last: None, window }
    }

    /// Record a click; true when it should start an expansion. Every click
    /// refreshes the window, so a burst counts once.
    pub fn register(&mut self, node_id: &str, now: Instant) -> bool {
        let trigger = should_trigger_expand_within(
            self.last.as_ref().map(|(id, _)| id.as_str()),
            self.last.as_ref().map(|(_, at)| *at),
            node_id,
            now,
            self.window,
        );
        self.last = Some((node_id.to_string(), now));
        trigger
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// At most one exploration request runs per client.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another request holds the guard.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the in-flight slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
