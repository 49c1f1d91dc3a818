//! Lightweight peak tracking for pool accounting.

use std::cell::Cell;

use tracing::trace;

#[derive(Default)]
pub struct PeakTracker {
    current: Cell<usize>,
    peak: Cell<usize>,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new "in use" value; updates peak if higher.
    pub fn record(&self, in_use: usize) {
        self.current.set(in_use);
        if in_use > self.peak.get() {
            self.peak.set(in_use);
            trace!(in_use, "new pool peak");
        }
    }

    pub fn current(&self) -> usize {
        self.current.get()
    }

    pub fn peak(&self) -> usize {
        self.peak.get()
    }
}
