use std::time::Duration;

/// Poll interval for fixation, instruction and waiting phases.
pub const COARSE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Poll interval while a checkerboard is flashing.
pub const FLICKER_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Absolute-deadline pacing for one phase.
///
/// `start` and `deadline` are fixed at phase entry. Nothing is ever recomputed from
/// elapsed deltas, so polling jitter cannot accumulate across the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseScheduler {
    start: u64,
    deadline: u64,
}

impl PhaseScheduler {
    /// A duration past the end of the `u64` nanosecond range saturates to a
    /// deadline that is never reached, never a truncated one.
    pub fn new(start: u64, planned: Duration) -> Self {
        let planned = u64::try_from(planned.as_nanos()).unwrap_or(u64::MAX);
        Self {
            start,
            deadline: start.saturating_add(planned),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    pub fn is_elapsed(&self, now: u64) -> bool {
        now >= self.deadline
    }

    pub fn remaining(&self, now: u64) -> Duration {
        Duration::from_nanos(self.deadline.saturating_sub(now))
    }

    /// Fraction of the phase completed, clamped to `0.0..=1.0`.
    pub fn progress(&self, now: u64) -> f64 {
        let span = self.deadline - self.start;
        if span == 0 {
            return 1.0;
        }
        (now.saturating_sub(self.start) as f64 / span as f64).min(1.0)
    }

    /// Next time the loop should wake: one poll interval away, but never past the deadline.
    pub fn next_wakeup(&self, now: u64, poll: Duration) -> u64 {
        now.saturating_add(poll.as_nanos() as u64)
            .min(self.deadline)
            .max(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000_000;

    #[test]
    fn deadline_is_anchored_at_entry() {
        let s = PhaseScheduler::new(3 * SEC, Duration::from_secs(20));
        assert_eq!(s.deadline(), 23 * SEC);
        assert!(!s.is_elapsed(23 * SEC - 1));
        assert!(s.is_elapsed(23 * SEC));
        assert!(s.is_elapsed(30 * SEC));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let s = PhaseScheduler::new(0, Duration::from_millis(10));
        assert_eq!(s.remaining(4_000_000), Duration::from_millis(6));
        assert_eq!(s.remaining(50_000_000), Duration::ZERO);
    }

    #[test]
    fn zero_length_phase_is_elapsed_immediately() {
        let s = PhaseScheduler::new(7, Duration::ZERO);
        assert!(s.is_elapsed(7));
        assert_eq!(s.progress(7), 1.0);
    }

    #[test]
    fn wakeup_never_overshoots_deadline() {
        let s = PhaseScheduler::new(0, Duration::from_millis(5));
        assert_eq!(s.next_wakeup(0, COARSE_POLL_INTERVAL), 2_000_000);
        assert_eq!(s.next_wakeup(4_000_000, COARSE_POLL_INTERVAL), 5_000_000);
        assert_eq!(s.next_wakeup(9_000_000, COARSE_POLL_INTERVAL), 9_000_000);
    }

    #[test]
    fn oversized_duration_saturates_instead_of_wrapping() {
        let planned = Duration::from_secs(20_000_000_000);
        let s = PhaseScheduler::new(0, planned);
        assert_eq!(s.deadline(), u64::MAX);
        assert!(!s.is_elapsed(u64::MAX - 1));

        let s = PhaseScheduler::new(5 * SEC, Duration::MAX);
        assert_eq!(s.deadline(), u64::MAX);
    }

    #[test]
    fn progress_is_fraction_of_planned_duration() {
        let s = PhaseScheduler::new(SEC, Duration::from_secs(4));
        assert_eq!(s.progress(0), 0.0);
        assert_eq!(s.progress(2 * SEC), 0.25);
        assert_eq!(s.progress(9 * SEC), 1.0);
    }
}
