//! Time-of-day suppression window.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

use crate::domain::Severity;
use crate::error::{MigrationError, Result};

/// A daily window, evaluated at a fixed UTC offset, during which alerts are
/// held back. The window may wrap midnight (`22:00`-`07:00`). Equal start
/// and end mean an empty window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
    allow_critical: bool,
    offset: FixedOffset,
}

impl QuietHours {
    pub fn new(
        start: NaiveTime,
        end: NaiveTime,
        allow_critical: bool,
        utc_offset_minutes: i32,
    ) -> Result<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                MigrationError::Configuration(format!(
                    "quiet hours utc offset {utc_offset_minutes} minutes is out of range"
                ))
            })?;
        Ok(Self {
            start,
            end,
            allow_critical,
            offset,
        })
    }

    /// Whether `at` falls inside the window (start inclusive, end exclusive).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset).time();
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }

    /// Whether an alert of `severity` sent at `at` should be held back.
    pub fn suppresses(&self, severity: Severity, at: DateTime<Utc>) -> bool {
        if self.allow_critical && severity == Severity::Critical {
            return false;
        }
        self.contains(at)
    }
}
