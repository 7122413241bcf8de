use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Remaining time that is burned in a spin loop instead of handed to the OS scheduler.
const SPIN_MARGIN: Duration = Duration::from_micros(500);

/// Monotonic time source shared by every timing component.
///
/// Timestamps are nanoseconds since the clock's origin and never decrease.
/// The wall clock is only for human-readable log entries, never for intervals.
pub trait Clock: Clone {
    fn now(&self) -> u64;

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration);

    /// Sleeps until `deadline`; returns at once if it already passed.
    fn sleep_until(&self, deadline: u64) {
        let now = self.now();
        if deadline > now {
            self.sleep(Duration::from_nanos(deadline - now));
        }
    }

    fn wall_clock(&self) -> DateTime<Local>;
}

/// Real clock backed by [`Instant`] with platform-specific high precision sleep.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    pub start: Instant,
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }

    fn wall_clock(&self) -> DateTime<Local> {
        Local::now()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Converts a clock timestamp back to an [`Instant`], e.g. for event loop wakeups.
    pub fn instant_at(&self, ts: u64) -> Instant {
        self.start + Duration::from_nanos(ts)
    }

    /// Coarse OS sleep followed by a short spin so the wakeup lands on the target.
    pub fn high_precision_sleep(&self, duration: Duration) {
        let target = Instant::now() + duration;
        if duration > SPIN_MARGIN {
            let coarse = duration - SPIN_MARGIN;
            #[cfg(target_os = "windows")]
            self.windows_sleep(coarse);
            #[cfg(target_os = "linux")]
            self.linux_sleep(coarse);
            #[cfg(not(any(target_os = "windows", target_os = "linux")))]
            std::thread::sleep(coarse);

            let woke = Instant::now();
            if woke > target {
                log::debug!("OS sleep of {:?} overshot its target by {:?}", coarse, woke - target);
            }
        }
        while Instant::now() < target {
            std::hint::spin_loop();
        }
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject, INFINITE,
        };

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, PCWSTR::null()) else {
                log::warn!("waitable timer unavailable, falling back to thread::sleep");
                std::thread::sleep(duration);
                return;
            };

            // negative due time is relative, in 100 ns intervals
            let due_time = -((duration.as_nanos() / 100) as i64);

            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }

            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                if rc != 0 {
                    log::warn!("clock_nanosleep failed with error {}", rc);
                }
                break;
            }
            req = rem;
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock for tests and dry runs. Sleeping advances the shared time instantly.
///
/// Clones share the same time, so a test can hold one handle and advance it while a
/// sequencer owns another.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now_ns: Arc<AtomicU64>,
    wall_origin: DateTime<Local>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(0)),
            wall_origin: Local::now(),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves time forward to `ts`. Earlier values are ignored to keep time monotonic.
    pub fn set(&self, ts: u64) {
        self.now_ns.fetch_max(ts, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn wall_clock(&self) -> DateTime<Local> {
        self.wall_origin + chrono::Duration::nanoseconds(self.now() as i64)
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn high_precision_sleep_does_not_wake_early() {
        let clock = MonotonicClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(3));
        assert!(clock.elapsed(before) >= Duration::from_millis(3));
    }

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let clock = SimulatedClock::new();
        clock.advance(Duration::from_millis(10));
        clock.sleep_until(5_000_000);
        assert_eq!(clock.now(), 10_000_000);
    }

    #[test]
    fn simulated_clones_share_time() {
        let clock = SimulatedClock::new();
        let other = clock.clone();
        other.sleep_until(2_500_000);
        assert_eq!(clock.now(), 2_500_000);

        clock.set(1_000);
        assert_eq!(other.now(), 2_500_000);
    }

    #[test]
    fn simulated_wall_clock_follows_virtual_time() {
        let clock = SimulatedClock::new();
        let before = clock.wall_clock();
        clock.advance(Duration::from_millis(1500));
        let after = clock.wall_clock();
        assert_eq!((after - before).num_milliseconds(), 1500);
    }
}
