//! Structured lifecycle events for batch runs and monitor sessions.
//!
//! Every run gets a correlation id carried by [`run_span`], so all log
//! lines from one run can be grouped; the `emit_*` functions write
//! one `info!` event per lifecycle step with a stable `event` field.

use tracing::{info, warn};
use uuid::Uuid;

/// Fresh correlation id for a run or monitor session.
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span carrying the correlation id. Attach it to the run's future with
/// [`tracing::Instrument::instrument`].
pub fn run_span(kind: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("migration.run", kind = %kind, run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, total_items: usize, batch_size: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        total_items = total_items,
        batch_size = batch_size,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
    );
}

pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", run_id = %run_id, error = %error);
}

/// One migration attempt finished for an item.
pub fn emit_item_attempt(item: &str, round: u32, attempt: u32, success: bool) {
    info!(
        event = "item.attempted",
        item = %item,
        round = round,
        attempt = attempt,
        success = success,
    );
}

pub fn emit_pass_finished(round: u32, chunks: usize, attempted: usize, failed: usize) {
    info!(
        event = "pass.finished",
        round = round,
        chunks = chunks,
        attempted = attempted,
        failed = failed,
    );
}

pub fn emit_cycle_completed(cycle: u64, healthy: bool, migrated: u64, total: u64) {
    info!(
        event = "monitor.cycle_completed",
        cycle = cycle,
        healthy = healthy,
        migrated = migrated,
        total = total,
    );
}

pub fn emit_alert_dispatched(alert_type: &str, severity: &str, delivered: usize, failed: usize) {
    info!(
        event = "alert.dispatched",
        alert_type = %alert_type,
        severity = %severity,
        delivered = delivered,
        failed = failed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique_uuids() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_run_span_can_be_entered() {
        let span = run_span("batch", "run-42");
        let _guard = span.enter();
        emit_pass_finished(0, 3, 23, 2);
    }
}
