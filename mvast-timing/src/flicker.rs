//! Drift-free pacing of the two-image checkerboard flash.
//!
//! A flash at `f` Hz swaps images `2f` times per second. Flip deadlines form the
//! arithmetic progression `start + k * frame` for `k = 1, 2, ...`, evaluated from the
//! phase anchor every time, so one late tick never shifts the deadlines after it.
//!
//! When the loop stalls past several deadlines the engine still toggles only once and
//! jumps to the next deadline that lies in the future. Catching up with a burst of
//! toggles would show an irregular flash.

use std::time::Duration;

/// Outcome of a tick that swapped the visible image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    /// Index (0 or 1) of the image that is now visible.
    pub visible: usize,
    /// 1-based count of toggles so far in this phase.
    pub count: u64,
    /// The deadline this toggle serviced.
    pub deadline: u64,
    /// How far past `deadline` the tick arrived.
    pub lateness: Duration,
    /// Whole frame periods that passed without a toggle of their own.
    pub skipped_frames: u64,
}

/// Toggle accounting handed to the timing recorder when the phase closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlickerReport {
    pub expected_toggles: u64,
    pub actual_toggles: u64,
    pub skipped_frames: u64,
    pub max_lateness: Duration,
}

impl FlickerReport {
    /// A count more than one away from `round(D * 2f)` is a distinct symptom from drift.
    pub fn is_mismatch(&self) -> bool {
        self.actual_toggles.abs_diff(self.expected_toggles) > 1
    }
}

#[derive(Debug, Clone)]
pub struct FlickerEngine {
    start: u64,
    frame_ns: f64,
    next_index: u64,
    visible: usize,
    toggles: u64,
    skipped_frames: u64,
    max_lateness: Duration,
    expected_toggles: u64,
}

impl FlickerEngine {
    /// `frequency_hz` must be positive and finite; the caller validates configuration.
    pub fn new(start: u64, duration: Duration, frequency_hz: f64) -> Self {
        let changes_per_sec = 2.0 * frequency_hz;
        Self {
            start,
            frame_ns: 1e9 / changes_per_sec,
            next_index: 1,
            visible: 0,
            toggles: 0,
            skipped_frames: 0,
            max_lateness: Duration::ZERO,
            expected_toggles: (duration.as_secs_f64() * changes_per_sec).round() as u64,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(self.frame_ns.round() as u64)
    }

    /// Deadline of the `k`-th flip, computed from the phase anchor.
    ///
    /// Saturates at `u64::MAX` for periods too long to represent, which the loop
    /// treats as a flip that never comes.
    pub fn deadline(&self, k: u64) -> u64 {
        self.start
            .saturating_add((k as f64 * self.frame_ns).round() as u64)
    }

    pub fn next_flip_deadline(&self) -> u64 {
        self.deadline(self.next_index)
    }

    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn toggles(&self) -> u64 {
        self.toggles
    }

    pub fn tick(&mut self, now: u64) -> Option<Toggle> {
        let due = self.next_flip_deadline();
        if now < due {
            return None;
        }

        // Latest deadline index that is not in the future.
        let mut reached = ((now - self.start) as f64 / self.frame_ns).floor() as u64;
        while self.deadline(reached + 1) <= now {
            reached += 1;
        }
        while reached > self.next_index && self.deadline(reached) > now {
            reached -= 1;
        }
        let reached = reached.max(self.next_index);

        let skipped = reached - self.next_index;
        let lateness = Duration::from_nanos(now - due);

        self.next_index = reached + 1;
        self.visible ^= 1;
        self.toggles += 1;
        self.skipped_frames += skipped;
        self.max_lateness = self.max_lateness.max(lateness);

        Some(Toggle {
            visible: self.visible,
            count: self.toggles,
            deadline: due,
            lateness,
            skipped_frames: skipped,
        })
    }

    pub fn report(&self) -> FlickerReport {
        FlickerReport {
            expected_toggles: self.expected_toggles,
            actual_toggles: self.toggles,
            skipped_frames: self.skipped_frames,
            max_lateness: self.max_lateness,
        }
    }
}
