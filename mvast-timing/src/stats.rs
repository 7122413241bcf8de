use std::collections::VecDeque;
use std::time::Duration;

/// Loop jitter statistics over the most recent tick intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSummary {
    pub samples: usize,
    pub average_interval_ns: f64,
    pub jitter_ns: f64,
    pub min_interval_ns: f64,
    pub max_interval_ns: f64,
}

/// Records tick-to-tick intervals in a bounded ring.
#[derive(Debug, Clone)]
pub struct TickStats {
    intervals: VecDeque<Duration>,
    max_samples: usize,
    last_tick: Option<u64>,
}

impl TickStats {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            last_tick: None,
        }
    }

    pub fn record_tick(&mut self, now: u64) {
        if let Some(last) = self.last_tick.replace(now) {
            self.record_interval(Duration::from_nanos(now.saturating_sub(last)));
        }
    }

    pub fn record_interval(&mut self, d: Duration) {
        if self.intervals.len() >= self.max_samples {
            self.intervals.pop_front();
        }
        self.intervals.push_back(d);
    }

    pub fn summary(&self) -> TickSummary {
        let times: Vec<f64> = self
            .intervals
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return TickSummary {
                samples: 0,
                average_interval_ns: 0.0,
                jitter_ns: 0.0,
                min_interval_ns: 0.0,
                max_interval_ns: 0.0,
            };
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        TickSummary {
            samples: times.len(),
            average_interval_ns: avg,
            jitter_ns: var.sqrt(),
            min_interval_ns: times.iter().copied().fold(f64::INFINITY, f64::min),
            max_interval_ns: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_is_zeroed() {
        let stats = TickStats::new();
        let summary = stats.summary();
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.max_interval_ns, 0.0);
    }

    #[test]
    fn first_tick_only_sets_anchor() {
        let mut stats = TickStats::new();
        stats.record_tick(100);
        assert_eq!(stats.summary().samples, 0);
        stats.record_tick(300);
        assert_eq!(stats.summary().samples, 1);
        assert_eq!(stats.summary().average_interval_ns, 200.0);
    }

    #[test]
    fn summary_reports_spread() {
        let mut stats = TickStats::new();
        for ns in [1_000, 3_000, 1_000, 3_000] {
            stats.record_interval(Duration::from_nanos(ns));
        }
        let s = stats.summary();
        assert_eq!(s.average_interval_ns, 2_000.0);
        assert_eq!(s.jitter_ns, 1_000.0);
        assert_eq!(s.min_interval_ns, 1_000.0);
        assert_eq!(s.max_interval_ns, 3_000.0);
    }

    #[test]
    fn ring_drops_oldest_samples() {
        let mut stats = TickStats::with_capacity(3);
        for ns in [10, 20, 30, 40] {
            stats.record_interval(Duration::from_nanos(ns));
        }
        let s = stats.summary();
        assert_eq!(s.samples, 3);
        assert_eq!(s.min_interval_ns, 20.0);
    }
}
