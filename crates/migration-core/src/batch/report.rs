//! Batch run summary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Success-rate bands mapped to process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunClassification {
    /// At least 95% migrated.
    Ok,
    /// 80% up to 95%.
    Warning,
    /// Below 80%.
    Error,
}

impl RunClassification {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= 95.0 {
            RunClassification::Ok
        } else if rate >= 80.0 {
            RunClassification::Warning
        } else {
            RunClassification::Error
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunClassification::Ok => 0,
            RunClassification::Warning => 1,
            RunClassification::Error => 2,
        }
    }
}

impl fmt::Display for RunClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunClassification::Ok => "ok",
            RunClassification::Warning => "warning",
            RunClassification::Error => "error",
        })
    }
}

/// One pass over the item set. Round 0 is the initial pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub round: u32,
    pub chunks: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub total: usize,
    /// Items that ended `Migrated`, including ones skipped as already done.
    pub succeeded: usize,
    /// `total - succeeded`.
    pub failed: usize,
    /// Already `Migrated` when the run started.
    pub skipped: usize,
    /// Percent in `0.0..=100.0`. An empty run counts as 100.
    pub success_rate: f64,
    pub passes: Vec<PassSummary>,
    /// Items that ended `Failed`, with their last error.
    pub failures: Vec<ItemFailure>,
    /// Set when an operator stop ended the run early.
    pub stopped: bool,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub classification: RunClassification,
}

impl BatchReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        run_id: String,
        total: usize,
        succeeded: usize,
        skipped: usize,
        passes: Vec<PassSummary>,
        failures: Vec<ItemFailure>,
        stopped: bool,
        duration: Duration,
    ) -> Self {
        let success_rate = if total == 0 {
            100.0
        } else {
            succeeded as f64 * 100.0 / total as f64
        };
        Self {
            run_id,
            total,
            succeeded,
            failed: total - succeeded,
            skipped,
            success_rate,
            passes,
            failures,
            stopped,
            duration,
            classification: RunClassification::from_success_rate(success_rate),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.classification.exit_code()
    }

    /// Human-readable multi-line summary for the console.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Migration run {}: {}/{} migrated ({:.1}%), {} failed, {} skipped in {}s [{}]\n",
            self.run_id,
            self.succeeded,
            self.total,
            self.success_rate,
            self.failed,
            self.skipped,
            self.duration.as_secs(),
            self.classification,
        );
        for pass in &self.passes {
            out.push_str(&format!(
                "  round {}: {} chunk(s), {} attempted, {} ok, {} failed\n",
                pass.round, pass.chunks, pass.attempted, pass.succeeded, pass.failed
            ));
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "  FAILED {} after {} attempt(s): {}\n",
                failure.item, failure.attempts, failure.reason
            ));
        }
        if self.stopped {
            out.push_str("  run stopped by operator before completion\n");
        }
        out
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bands() {
        assert_eq!(RunClassification::from_success_rate(100.0), RunClassification::Ok);
        assert_eq!(RunClassification::from_success_rate(95.0), RunClassification::Ok);
        assert_eq!(RunClassification::from_success_rate(94.9), RunClassification::Warning);
        assert_eq!(RunClassification::from_success_rate(80.0), RunClassification::Warning);
        assert_eq!(RunClassification::from_success_rate(79.9), RunClassification::Error);
        assert_eq!(RunClassification::Warning.exit_code(), 1);
    }

    #[test]
    fn test_empty_run_is_ok() {
        let report = BatchReport::new("r".into(), 0, 0, 0, vec![], vec![], false, Duration::ZERO);
        assert_eq!(report.success_rate, 100.0);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_render_lists_failures() {
        let report = BatchReport::new(
            "r1".into(),
            10,
            7,
            1,
            vec![PassSummary {
                round: 0,
                chunks: 1,
                attempted: 9,
                succeeded: 6,
                failed: 3,
            }],
            vec![ItemFailure {
                item: "ledger".into(),
                reason: "exit code 1: locked".into(),
                attempts: 4,
            }],
            false,
            Duration::from_secs(12),
        );
        assert_eq!(report.failed, 3);
        assert_eq!(report.classification, RunClassification::Error);
        let text = report.render();
        assert!(text.contains("7/10 migrated (70.0%)"));
        assert!(text.contains("FAILED ledger after 4 attempt(s): exit code 1: locked"));
    }
}
