//! Trailing metric window selection.
//!
//! A run asks the monitoring backend for `[now - lookback, now - offset]`.
//! The offset keeps the window clear of buckets the backend has not
//! materialized yet, so it must stay strictly positive.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};

use crate::error::{AutoscaleError, AutoscaleResult};

/// Longest lookback accepted from configuration.
const MAX_LOOKBACK: Duration = Duration::from_secs(31 * 24 * 3600);

/// Lookback, ingestion offset, and bucket size for metric queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub lookback: Duration,
    pub offset: Duration,
    pub granularity: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(3600),
            offset: Duration::from_secs(600),
            granularity: Duration::from_secs(3600),
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> AutoscaleResult<()> {
        if self.offset.is_zero() {
            return Err(AutoscaleError::InvalidConfiguration(
                "window offset must be greater than zero".to_string(),
            ));
        }
        if self.lookback <= self.offset {
            return Err(AutoscaleError::InvalidConfiguration(format!(
                "window lookback ({}s) must exceed offset ({}s)",
                self.lookback.as_secs(),
                self.offset.as_secs()
            )));
        }
        if self.lookback > MAX_LOOKBACK {
            return Err(AutoscaleError::InvalidConfiguration(format!(
                "window lookback ({}s) exceeds {}s",
                self.lookback.as_secs(),
                MAX_LOOKBACK.as_secs()
            )));
        }
        if self.granularity.as_secs() == 0 {
            return Err(AutoscaleError::InvalidConfiguration(
                "window granularity must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// The window a run starting at `now` should query.
    pub fn window_ending_at(&self, now: DateTime<Utc>) -> MetricWindow {
        let now = truncate_to_minute(now);
        MetricWindow {
            start: now - to_delta(self.lookback),
            end: now - to_delta(self.offset),
            granularity: self.granularity,
        }
    }
}

/// A concrete query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Duration,
}

impl MetricWindow {
    /// Granularity as an ISO-8601 duration (`PT1H`, `PT5M`, `P1D`).
    pub fn granularity_iso8601(&self) -> String {
        iso8601(self.granularity)
    }
}

fn iso8601(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 86_400 == 0 {
        format!("P{}D", secs / 86_400)
    } else if secs > 0 && secs % 3600 == 0 {
        format!("PT{}H", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("PT{}M", secs / 60)
    } else {
        format!("PT{secs}S")
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::try_seconds(d.as_secs() as i64).unwrap_or(TimeDelta::zero())
}
