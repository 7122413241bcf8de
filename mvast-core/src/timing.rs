use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::phase::Phase;

/// Wall-clock format used in the timing log (millisecond precision).
pub const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_wall_clock(ts: &DateTime<Local>) -> String {
    ts.format(WALL_CLOCK_FORMAT).to_string()
}

/// One row of the timing log.
///
/// Field names and order are read by downstream analysis scripts; keep them stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingLogEntry {
    pub label: String,
    pub expected_duration_ms: f64,
    pub actual_duration_ms: f64,
    /// `actual - expected`, in milliseconds.
    pub drift_ms: f64,
    pub start_wall_clock: String,
    pub end_wall_clock: String,
}

impl TimingLogEntry {
    pub fn new(
        label: impl Into<String>,
        expected: Duration,
        actual: Duration,
        start_wall: &DateTime<Local>,
        end_wall: &DateTime<Local>,
    ) -> Self {
        let expected_duration_ms = expected.as_secs_f64() * 1e3;
        let actual_duration_ms = actual.as_secs_f64() * 1e3;
        Self {
            label: label.into(),
            expected_duration_ms,
            actual_duration_ms,
            drift_ms: actual_duration_ms - expected_duration_ms,
            start_wall_clock: format_wall_clock(start_wall),
            end_wall_clock: format_wall_clock(end_wall),
        }
    }

    /// Builds the entry for a closed phase; `None` while the phase is still open.
    pub fn from_phase(phase: &Phase) -> Option<Self> {
        let actual = phase.actual()?;
        let end_wall = phase.end_wall?;
        Some(Self::new(
            phase.label(),
            phase.planned,
            actual,
            &phase.start_wall,
            &end_wall,
        ))
    }

    pub fn exceeds(&self, threshold_ms: f64) -> bool {
        self.drift_ms.abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseKind;

    #[test]
    fn drift_is_actual_minus_expected() {
        let wall = Local::now();
        let mut phase = Phase::open(PhaseKind::Checkerboard, Some(1), Duration::from_secs(20), 0, wall);
        assert!(TimingLogEntry::from_phase(&phase).is_none());

        phase.close(20_150_000_000, wall + chrono::Duration::milliseconds(20_150));
        let entry = TimingLogEntry::from_phase(&phase).unwrap();
        assert_eq!(entry.label, "cycle 1 checkerboard");
        assert_eq!(entry.expected_duration_ms, 20_000.0);
        assert_eq!(entry.actual_duration_ms, 20_150.0);
        assert_eq!(entry.drift_ms, 150.0);
        assert!(entry.exceeds(100.0));
        assert!(!entry.exceeds(200.0));
    }

    #[test]
    fn serialized_field_order_is_stable() {
        let wall = Local::now();
        let entry = TimingLogEntry::new("instruction", Duration::from_secs(10), Duration::from_secs(10), &wall, &wall);
        let json = serde_json::to_string(&entry).unwrap();
        let keys = [
            "\"label\"",
            "\"expected_duration_ms\"",
            "\"actual_duration_ms\"",
            "\"drift_ms\"",
            "\"start_wall_clock\"",
            "\"end_wall_clock\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn wall_clock_has_millisecond_precision() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_milli_opt(9, 8, 7, 65)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap();
        assert_eq!(format_wall_clock(&ts), "2025-03-04 09:08:07.065");
    }
}
