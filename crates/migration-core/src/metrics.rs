//! Process-wide atomic counters.
//!
//! Counters are bumped at the call site. [`Metrics::flush`] emits all of
//! them as one `info!` event, typically at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    items_migrated: AtomicU64,
    items_failed: AtomicU64,
    alerts_delivered: AtomicU64,
    alerts_suppressed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            items_migrated: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            alerts_delivered: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
        }
    }

    pub fn inc_items_migrated(&self) {
        self.items_migrated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_migrated", "counter incremented");
    }

    /// Counts failed attempts, not only exhausted items.
    pub fn inc_items_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_failed", "counter incremented");
    }

    pub fn inc_alerts_delivered(&self) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "alerts_delivered", "counter incremented");
    }

    pub fn inc_alerts_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "alerts_suppressed", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            items_migrated = self.items_migrated(),
            items_failed = self.items_failed(),
            alerts_delivered = self.alerts_delivered(),
            alerts_suppressed = self.alerts_suppressed(),
        );
    }

    pub fn items_migrated(&self) -> u64 {
        self.items_migrated.load(Ordering::Relaxed)
    }

    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    pub fn alerts_delivered(&self) -> u64 {
        self.alerts_delivered.load(Ordering::Relaxed)
    }

    pub fn alerts_suppressed(&self) -> u64 {
        self.alerts_suppressed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.items_migrated.store(0, Ordering::Relaxed);
        self.items_failed.store(0, Ordering::Relaxed);
        self.alerts_delivered.store(0, Ordering::Relaxed);
        self.alerts_suppressed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_reset() {
        let m = Metrics::new();
        m.inc_items_migrated();
        m.inc_items_migrated();
        m.inc_items_failed();
        m.inc_alerts_suppressed();
        assert_eq!(m.items_migrated(), 2);
        assert_eq!(m.items_failed(), 1);
        assert_eq!(m.alerts_delivered(), 0);
        assert_eq!(m.alerts_suppressed(), 1);

        m.reset();
        assert_eq!(m.items_migrated(), 0);
        assert_eq!(m.alerts_suppressed(), 0);
    }
}
