use chrono::{DateTime, Local};
use mvast_core::{format_wall_clock, Phase, TaskError, TimingLogEntry};
use mvast_timing::FlickerReport;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Aggregate over every recorded phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// `label == "total"`; same fields as a phase entry.
    #[serde(flatten)]
    pub total: TimingLogEntry,
    pub total_expected_ms: f64,
    pub total_actual_ms: f64,
    pub flagged_phases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleRecord {
    pub label: String,
    pub expected_toggles: u64,
    pub actual_toggles: u64,
    pub skipped_frames: u64,
    pub max_lateness_ms: f64,
    pub mismatch: bool,
}

/// One fixation + checkerboard pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub cycle: usize,
    pub start_wall: DateTime<Local>,
    pub duration: Duration,
}

#[derive(Serialize)]
struct TimingLogFile<'a> {
    entries: &'a [TimingLogEntry],
    summary: RunSummary,
    toggle_reports: &'a [ToggleRecord],
}

/// Append-only sink for closed phases.
///
/// Nothing here feeds back into scheduling. Drift beyond the threshold is logged
/// and counted, never corrected.
#[derive(Debug, Clone)]
pub struct TimingRecorder {
    drift_threshold_ms: f64,
    entries: Vec<TimingLogEntry>,
    flagged: usize,
    toggles: Vec<ToggleRecord>,
    cycles: Vec<CycleRecord>,
    first_wall: Option<DateTime<Local>>,
    last_wall: Option<DateTime<Local>>,
}

impl TimingRecorder {
    pub fn new(drift_threshold_ms: f64) -> Self {
        Self {
            drift_threshold_ms,
            entries: Vec::new(),
            flagged: 0,
            toggles: Vec::new(),
            cycles: Vec::new(),
            first_wall: None,
            last_wall: None,
        }
    }

    /// Appends the entry for a closed phase. An open phase is ignored.
    pub fn record_phase(&mut self, phase: Phase) {
        let Some(entry) = TimingLogEntry::from_phase(&phase) else {
            log::warn!("{} is still open; not recorded", phase.label());
            return;
        };
        if entry.exceeds(self.drift_threshold_ms) {
            self.flagged += 1;
            log::warn!(
                "Timing drift in {}: expected {:.1} ms, actual {:.1} ms, drift {:+.1} ms",
                entry.label,
                entry.expected_duration_ms,
                entry.actual_duration_ms,
                entry.drift_ms
            );
        }
        self.first_wall.get_or_insert(phase.start_wall);
        self.last_wall = phase.end_wall;
        self.entries.push(entry);
    }

    pub fn record_flicker(&mut self, label: impl Into<String>, report: FlickerReport) {
        let label = label.into();
        if report.is_mismatch() {
            log::warn!(
                "Toggle count mismatch in {}: expected {}, actual {} ({} frames skipped)",
                label,
                report.expected_toggles,
                report.actual_toggles,
                report.skipped_frames
            );
        }
        self.toggles.push(ToggleRecord {
            label,
            expected_toggles: report.expected_toggles,
            actual_toggles: report.actual_toggles,
            skipped_frames: report.skipped_frames,
            max_lateness_ms: report.max_lateness.as_secs_f64() * 1e3,
            mismatch: report.is_mismatch(),
        });
    }

    pub fn record_cycle(&mut self, cycle: usize, start_wall: DateTime<Local>, duration: Duration) {
        log::info!(
            "Cycle {} complete: started {}, lasted {:.3} s",
            cycle,
            format_wall_clock(&start_wall),
            duration.as_secs_f64()
        );
        self.cycles.push(CycleRecord {
            cycle,
            start_wall,
            duration,
        });
    }

    pub fn entries(&self) -> &[TimingLogEntry] {
        &self.entries
    }

    pub fn toggle_reports(&self) -> &[ToggleRecord] {
        &self.toggles
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged
    }

    pub fn drift_threshold_ms(&self) -> f64 {
        self.drift_threshold_ms
    }

    pub fn summary(&self) -> RunSummary {
        let expected: f64 = self.entries.iter().map(|e| e.expected_duration_ms).sum();
        let actual: f64 = self.entries.iter().map(|e| e.actual_duration_ms).sum();
        // stamps come from recorded phases only; empty when nothing ran
        let stamp = |wall: Option<&DateTime<Local>>| wall.map(format_wall_clock).unwrap_or_default();
        let total = TimingLogEntry {
            label: "total".to_string(),
            expected_duration_ms: expected,
            actual_duration_ms: actual,
            drift_ms: actual - expected,
            start_wall_clock: stamp(self.first_wall.as_ref()),
            end_wall_clock: stamp(self.last_wall.as_ref().or(self.first_wall.as_ref())),
        };
        RunSummary {
            total,
            total_expected_ms: expected,
            total_actual_ms: actual,
            flagged_phases: self.flagged,
        }
    }

    pub fn to_json(&self) -> Result<String, TaskError> {
        let file = TimingLogFile {
            entries: &self.entries,
            summary: self.summary(),
            toggle_reports: &self.toggles,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), TaskError> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Timing log saved to {}", path.display());
        Ok(())
    }
}
