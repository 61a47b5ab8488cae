use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for failures that are recovered locally instead of surfacing
/// as errors.
#[derive(Debug, Default)]
pub struct Diagnostics {
    parse_failures: AtomicU64,
    unexpected_exits: AtomicU64,
    dropped_events: AtomicU64,
}

impl Diagnostics {
    /// Lines from the utility that did not split into three fields.
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    /// Shell sessions that ended while still expected to run.
    pub fn unexpected_exits(&self) -> u64 {
        self.unexpected_exits.load(Ordering::Relaxed)
    }

    /// Events with no kind of interest or no resolvable path.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unexpected_exit(&self) {
        self.unexpected_exits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }
}
