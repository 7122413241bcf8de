use crate::config::RunConfig;
use crate::input::{KeyboardQueue, SymbolSource, CANCEL_KEY};
use crate::recorder::TimingRecorder;
use crate::trigger::TriggerDetector;
use chrono::{DateTime, Local};
use mvast_core::{
    format_wall_clock, CancelReason, CheckerImage, CyclePhase, Phase, PhaseKind, RunState,
    Stimulus, StimulusDisplay, TaskError, TriggerEvent,
};
use mvast_timing::{
    Clock, FlickerEngine, PhaseScheduler, TickStats, TickSummary, COARSE_POLL_INTERVAL,
    FLICKER_POLL_INTERVAL,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct OpenPhase {
    phase: Phase,
    scheduler: PhaseScheduler,
}

/// Drives one run: Idle, Waiting, Instruction, the fixation/checkerboard cycles,
/// then Completed or Cancelled.
///
/// Everything happens inside [`tick`](Self::tick), called from a single loop. Each tick
/// drains the keyboard, honours the cancel key, then either polls for the start
/// trigger or services the flicker and the phase deadline, in that order.
pub struct TaskSequencer<C: Clock, D: StimulusDisplay> {
    config: RunConfig,
    clock: C,
    display: D,
    keyboard: KeyboardQueue,
    detector: TriggerDetector,
    recorder: Option<TimingRecorder>,
    state: RunState,
    current: Option<OpenPhase>,
    flicker: Option<FlickerEngine>,
    trigger: Option<TriggerEvent>,
    cycle_start: Option<(u64, DateTime<Local>)>,
    tick_stats: TickStats,
}

impl<C: Clock, D: StimulusDisplay> TaskSequencer<C, D> {
    pub fn new(config: RunConfig, clock: C, display: D) -> Self {
        let detector = TriggerDetector::from_config(&config);
        Self {
            config,
            clock,
            display,
            keyboard: KeyboardQueue::new(),
            detector,
            recorder: None,
            state: RunState::Idle,
            current: None,
            flicker: None,
            trigger: None,
            cycle_start: None,
            tick_stats: TickStats::new(),
        }
    }

    /// Attaches the serial trigger channel (or the error from opening it).
    pub fn with_serial(mut self, source: Result<Box<dyn SymbolSource>, TaskError>) -> Self {
        self.detector = self.detector.with_serial(source);
        self
    }

    /// Shares keystrokes with the window layer.
    pub fn with_keyboard(mut self, keyboard: KeyboardQueue) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn keyboard(&self) -> KeyboardQueue {
        self.keyboard.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn detector(&self) -> &TriggerDetector {
        &self.detector
    }

    /// `None` until pre-run validation has passed.
    pub fn recorder(&self) -> Option<&TimingRecorder> {
        self.recorder.as_ref()
    }

    pub fn trigger_event(&self) -> Option<&TriggerEvent> {
        self.trigger.as_ref()
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.current.as_ref().map(|open| &open.phase)
    }

    pub fn tick_summary(&self) -> TickSummary {
        self.tick_stats.summary()
    }

    /// Pre-run validation, then Idle to Waiting.
    ///
    /// On failure the run goes straight to Cancelled and no phase is ever opened.
    pub fn start(&mut self) -> Result<(), TaskError> {
        if self.state != RunState::Idle {
            return Ok(());
        }
        if let Err(err) = self.config.validate() {
            log::error!("{}", err);
            self.state = RunState::Cancelled(CancelReason::Configuration);
            return Err(err);
        }
        let missing: Vec<String> = Stimulus::required()
            .into_iter()
            .filter(|s| !self.display.is_ready(*s))
            .map(|s| format!("{:?}", s))
            .collect();
        if !missing.is_empty() {
            let err = TaskError::Resource(format!("stimuli not loaded: {}", missing.join(", ")));
            log::error!("{}", err);
            self.state = RunState::Cancelled(CancelReason::Resource);
            return Err(err);
        }

        self.recorder = Some(TimingRecorder::new(self.config.drift_threshold_ms));
        self.state = RunState::Waiting;
        log::info!(
            "Waiting for start ({} mode, trigger '{}', channels {:?})",
            self.config.start_mode,
            self.config.trigger_character,
            self.detector.sources()
        );
        self.show(Stimulus::WaitingForStart)
    }

    /// One iteration of the control loop. Returns the state after the tick.
    ///
    /// A display failure cancels the run and is returned as the error.
    pub fn tick(&mut self) -> Result<RunState, TaskError> {
        if self.state == RunState::Idle || self.state.is_terminal() {
            return Ok(self.state);
        }
        let now = self.clock.now();
        self.tick_stats.record_tick(now);

        let keys = self.keyboard.drain();
        if keys.contains(&CANCEL_KEY) {
            log::info!("Cancel key pressed during {}", self.state);
            self.cancel(CancelReason::User);
            return Ok(self.state);
        }

        if self.state == RunState::Waiting {
            let wall = self.clock.wall_clock();
            if let Some(event) = self.detector.poll(&keys, now, wall) {
                log::info!(
                    "Run started by {} ('{}') at {}",
                    event.source,
                    event.symbol.escape_default(),
                    format_wall_clock(&event.wall_clock)
                );
                self.trigger = Some(event);
                self.enter(RunState::Instruction, now)?;
            }
        } else {
            self.advance(now)?;
        }
        Ok(self.state)
    }

    fn advance(&mut self, now: u64) -> Result<(), TaskError> {
        let Some(open) = self.current else {
            return Ok(());
        };

        if let Some(toggle) = self.flicker.as_mut().and_then(|engine| engine.tick(now)) {
            if toggle.skipped_frames > 0 {
                log::warn!(
                    "Flicker missed {} flip deadline(s) in {}, {:.2} ms late",
                    toggle.skipped_frames,
                    open.phase.label(),
                    toggle.lateness.as_secs_f64() * 1e3
                );
            } else {
                log::debug!("toggle {} -> image {}", toggle.count, toggle.visible);
            }
            // The flip that lands on the phase deadline completes the last half period
            // but is not shown.
            if !open.scheduler.is_elapsed(now) {
                self.show(Stimulus::Checkerboard(CheckerImage::from_index(toggle.visible)))?;
            }
        }

        if !open.scheduler.is_elapsed(now) {
            return Ok(());
        }
        self.close_current(now);
        if let RunState::Running { cycle, phase: CyclePhase::Checkerboard } = self.state {
            if let (Some((start, wall)), Some(recorder)) =
                (self.cycle_start.take(), self.recorder.as_mut())
            {
                recorder.record_cycle(cycle, wall, Duration::from_nanos(now - start));
            }
        }
        match self.state.next(self.config.cycle_count) {
            Some(next) => self.enter(next, now),
            None => Ok(()),
        }
    }

    fn enter(&mut self, next: RunState, now: u64) -> Result<(), TaskError> {
        let wall = self.clock.wall_clock();
        let (kind, planned, stimulus) = match next {
            RunState::Instruction => (
                PhaseKind::Instruction,
                self.config.instruction(),
                Stimulus::Instruction,
            ),
            RunState::Running { phase: CyclePhase::Fixation, .. } => {
                self.cycle_start = Some((now, wall));
                (PhaseKind::Fixation, self.config.fixation(), Stimulus::Fixation)
            }
            RunState::Running { phase: CyclePhase::Checkerboard, .. } => {
                for image in [CheckerImage::First, CheckerImage::Second] {
                    if !self.display.is_ready(Stimulus::Checkerboard(image)) {
                        let err = TaskError::Resource(format!("checkerboard image {:?} unavailable", image));
                        log::error!("{}", err);
                        self.cancel(CancelReason::Resource);
                        return Err(err);
                    }
                }
                let duration = self.config.checkerboard();
                self.flicker = Some(FlickerEngine::new(now, duration, self.config.flash_frequency));
                (
                    PhaseKind::Checkerboard,
                    duration,
                    Stimulus::Checkerboard(CheckerImage::First),
                )
            }
            RunState::Completed => {
                self.state = RunState::Completed;
                self.log_summary();
                return self.show(Stimulus::Complete);
            }
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let phase = Phase::open(kind, next.cycle(), planned, now, wall);
        log::info!(
            "{} started at {} (planned {:.3} s)",
            phase.label(),
            format_wall_clock(&wall),
            planned.as_secs_f64()
        );
        self.current = Some(OpenPhase {
            phase,
            scheduler: PhaseScheduler::new(now, planned),
        });
        self.state = next;
        self.show(stimulus)
    }

    /// Closes the open phase at `now` and hands it, plus any flicker report, to the recorder.
    fn close_current(&mut self, now: u64) {
        let Some(open) = self.current.take() else {
            return;
        };
        let mut phase = open.phase;
        phase.close(now, self.clock.wall_clock());
        if let Some(actual) = phase.actual() {
            log::info!(
                "{} ended after {:.3} s (planned {:.3} s)",
                phase.label(),
                actual.as_secs_f64(),
                phase.planned.as_secs_f64()
            );
        }
        let flicker = self.flicker.take();
        if let Some(recorder) = self.recorder.as_mut() {
            if let Some(engine) = flicker {
                recorder.record_flicker(phase.label(), engine.report());
            }
            recorder.record_phase(phase);
        }
    }

    /// Moves any non-terminal state to Cancelled. The open phase is recorded with
    /// the time it actually ran.
    pub fn cancel(&mut self, reason: CancelReason) {
        if self.state.is_terminal() {
            return;
        }
        let now = self.clock.now();
        let from = self.state;
        self.close_current(now);
        self.state = RunState::Cancelled(reason);
        log::warn!("Run cancelled during {} ({:?})", from, reason);
        if self.recorder.is_some() {
            self.log_summary();
        }
    }

    fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError> {
        if let Err(err) = self.display.show(stimulus) {
            log::error!("showing {:?} failed: {}", stimulus, err);
            self.cancel(CancelReason::Display);
            return Err(err);
        }
        Ok(())
    }

    fn log_summary(&self) {
        let Some(recorder) = self.recorder.as_ref() else {
            return;
        };
        let summary = recorder.summary();
        log::info!(
            "Run {}: {} phases, expected {:.3} s, actual {:.3} s, drift {:+.1} ms, {} over {} ms",
            self.state,
            recorder.entries().len(),
            summary.total_expected_ms / 1e3,
            summary.total_actual_ms / 1e3,
            summary.total.drift_ms,
            summary.flagged_phases,
            recorder.drift_threshold_ms()
        );
        let ticks = self.tick_stats.summary();
        if ticks.samples > 0 {
            log::info!(
                "Tick interval over last {} ticks: avg {:.3} ms, jitter {:.3} ms, min {:.3} ms, max {:.3} ms",
                ticks.samples,
                ticks.average_interval_ns / 1e6,
                ticks.jitter_ns / 1e6,
                ticks.min_interval_ns / 1e6,
                ticks.max_interval_ns / 1e6
            );
        }
    }

    /// Absolute time the loop should wake for the next tick.
    ///
    /// One poll interval away, pulled in to the phase deadline or the next flip,
    /// whichever comes first.
    pub fn next_wakeup(&self) -> u64 {
        let now = self.clock.now();
        let poll = if self.flicker.is_some() {
            FLICKER_POLL_INTERVAL
        } else {
            COARSE_POLL_INTERVAL
        };
        let mut wake = match &self.current {
            Some(open) => open.scheduler.next_wakeup(now, poll),
            None => now.saturating_add(poll.as_nanos() as u64),
        };
        if let Some(engine) = &self.flicker {
            wake = wake.min(engine.next_flip_deadline().max(now));
        }
        wake
    }

    /// Runs the loop on the calling thread until a terminal state.
    pub fn run(&mut self) -> Result<RunState, TaskError> {
        self.start()?;
        while !self.state.is_terminal() {
            self.tick()?;
            if self.state.is_terminal() {
                break;
            }
            self.clock.sleep_until(self.next_wakeup());
        }
        Ok(self.state)
    }

    pub fn into_parts(self) -> (D, Option<TimingRecorder>) {
        (self.display, self.recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::START_KEY;
    use mvast_core::StartMode;
    use mvast_timing::SimulatedClock;

    #[derive(Default)]
    struct NullDisplay {
        shown: Vec<Stimulus>,
    }

    impl StimulusDisplay for NullDisplay {
        fn is_ready(&self, _: Stimulus) -> bool {
            true
        }

        fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError> {
            self.shown.push(stimulus);
            Ok(())
        }
    }

    fn short_config() -> RunConfig {
        RunConfig {
            start_mode: StartMode::Manual,
            instruction_duration: 1.0,
            fixation_duration: 1.0,
            checkerboard_duration: 1.0,
            cycle_count: 1,
            ..RunConfig::default()
        }
    }

    #[test]
    fn tick_before_start_is_inert() {
        let clock = SimulatedClock::new();
        let mut seq = TaskSequencer::new(short_config(), clock, NullDisplay::default());
        assert_eq!(seq.tick().unwrap(), RunState::Idle);
        assert!(seq.display().shown.is_empty());
    }

    #[test]
    fn waiting_until_trigger() {
        let clock = SimulatedClock::new();
        let mut seq = TaskSequencer::new(short_config(), clock.clone(), NullDisplay::default());
        seq.start().unwrap();
        assert_eq!(seq.state(), RunState::Waiting);
        for _ in 0..10 {
            clock.advance(Duration::from_millis(2));
            assert_eq!(seq.tick().unwrap(), RunState::Waiting);
        }
        seq.keyboard().push(START_KEY);
        assert_eq!(seq.tick().unwrap(), RunState::Instruction);
        assert_eq!(seq.trigger_event().unwrap().timestamp, 20_000_000);
        assert_eq!(seq.current_phase().unwrap().start, 20_000_000);
    }

    #[test]
    fn wakeup_tracks_flip_deadlines_in_checkerboard() {
        let clock = SimulatedClock::new();
        let mut seq = TaskSequencer::new(short_config(), clock.clone(), NullDisplay::default());
        seq.start().unwrap();
        assert_eq!(seq.next_wakeup(), 2_000_000);

        seq.keyboard().push(START_KEY);
        seq.tick().unwrap();
        clock.set(1_000_000_000);
        seq.tick().unwrap();
        assert_eq!(seq.next_wakeup(), 1_002_000_000);
        clock.set(2_000_000_000);
        seq.tick().unwrap();
        assert!(matches!(
            seq.state(),
            RunState::Running { phase: CyclePhase::Checkerboard, .. }
        ));
        assert_eq!(seq.next_wakeup(), 2_000_500_000);
        clock.set(2_062_400_000);
        assert_eq!(seq.next_wakeup(), 2_062_500_000);
    }

    #[test]
    fn zero_instruction_closes_on_next_tick() {
        let config = RunConfig {
            instruction_duration: 0.0,
            ..short_config()
        };
        let clock = SimulatedClock::new();
        let mut seq = TaskSequencer::new(config, clock, NullDisplay::default());
        seq.start().unwrap();
        seq.keyboard().push(START_KEY);
        assert_eq!(seq.tick().unwrap(), RunState::Instruction);
        assert_eq!(seq.next_wakeup(), 0);
        assert_eq!(
            seq.tick().unwrap(),
            RunState::Running { cycle: 1, phase: CyclePhase::Fixation }
        );
        let entry = &seq.recorder().unwrap().entries()[0];
        assert_eq!(entry.label, "instruction");
        assert_eq!(entry.actual_duration_ms, 0.0);
        assert!(seq.display().shown.contains(&Stimulus::Instruction));
    }

    #[test]
    fn short_run_completes_and_logs_cycle() {
        let clock = SimulatedClock::new();
        let mut seq = TaskSequencer::new(short_config(), clock.clone(), NullDisplay::default());
        seq.keyboard().push(START_KEY);
        assert_eq!(seq.run().unwrap(), RunState::Completed);
        assert_eq!(clock.now(), 3_000_000_000);

        let recorder = seq.recorder().unwrap();
        assert_eq!(recorder.entries().len(), 3);
        assert_eq!(recorder.cycles().len(), 1);
        assert_eq!(recorder.cycles()[0].duration, Duration::from_secs(2));
        assert_eq!(recorder.toggle_reports()[0].actual_toggles, 16);
        assert_eq!(seq.display().shown.last(), Some(&Stimulus::Complete));

        // 16 flips, the last one lands on the phase end and is not shown
        let checker_shows = seq
            .display()
            .shown
            .iter()
            .filter(|s| matches!(s, Stimulus::Checkerboard(_)))
            .count();
        assert_eq!(checker_shows, 1 + 15);
    }
}
