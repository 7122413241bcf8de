use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;

/// Kind of a timed presentation interval.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Instruction,
    Fixation,
    Checkerboard,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Instruction => write!(f, "instruction"),
            PhaseKind::Fixation => write!(f, "fixation"),
            PhaseKind::Checkerboard => write!(f, "checkerboard"),
        }
    }
}

/// One contiguous, fixed-duration presentation interval.
///
/// `start`/`end` are monotonic clock timestamps (ns). The wall-clock copies exist only
/// for the human-readable timing log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub kind: PhaseKind,
    /// 1-based cycle index; `None` for the instruction phase.
    pub cycle: Option<usize>,
    pub planned: Duration,
    pub start: u64,
    pub end: Option<u64>,
    pub start_wall: DateTime<Local>,
    pub end_wall: Option<DateTime<Local>>,
}

impl Phase {
    pub fn open(
        kind: PhaseKind,
        cycle: Option<usize>,
        planned: Duration,
        start: u64,
        start_wall: DateTime<Local>,
    ) -> Self {
        Self {
            kind,
            cycle,
            planned,
            start,
            end: None,
            start_wall,
            end_wall: None,
        }
    }

    /// Sets the end once; later calls are ignored.
    pub fn close(&mut self, end: u64, end_wall: DateTime<Local>) {
        if self.end.is_none() {
            self.end = Some(end.max(self.start));
            self.end_wall = Some(end_wall);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    pub fn actual(&self) -> Option<Duration> {
        self.end.map(|end| Duration::from_nanos(end - self.start))
    }

    pub fn label(&self) -> String {
        match self.cycle {
            Some(cycle) => format!("cycle {} {}", cycle, self.kind),
            None => self.kind.to_string(),
        }
    }
}

/// Position inside a fixation/checkerboard cycle.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Fixation,
    Checkerboard,
}

impl From<CyclePhase> for PhaseKind {
    fn from(p: CyclePhase) -> Self {
        match p {
            CyclePhase::Fixation => PhaseKind::Fixation,
            CyclePhase::Checkerboard => PhaseKind::Checkerboard,
        }
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The operator pressed the cancel key or closed the window.
    User,
    Configuration,
    Resource,
    Display,
}

/// Run-level state machine.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    Idle,
    Waiting,
    Instruction,
    Running { cycle: usize, phase: CyclePhase },
    Completed,
    Cancelled(CancelReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled(_))
    }

    /// Kind of the timed phase active in this state, if any.
    pub fn phase_kind(&self) -> Option<PhaseKind> {
        match self {
            RunState::Instruction => Some(PhaseKind::Instruction),
            RunState::Running { phase, .. } => Some((*phase).into()),
            _ => None,
        }
    }

    pub fn cycle(&self) -> Option<usize> {
        match self {
            RunState::Running { cycle, .. } => Some(*cycle),
            _ => None,
        }
    }

    /// State entered once the current timed phase's deadline passes.
    ///
    /// Waiting is left on a trigger, not a deadline, so it has no successor here.
    pub fn next(&self, cycle_count: usize) -> Option<Self> {
        use RunState::*;
        Some(match *self {
            Instruction => Running {
                cycle: 1,
                phase: CyclePhase::Fixation,
            },
            Running {
                cycle,
                phase: CyclePhase::Fixation,
            } => Running {
                cycle,
                phase: CyclePhase::Checkerboard,
            },
            Running {
                cycle,
                phase: CyclePhase::Checkerboard,
            } if cycle < cycle_count => Running {
                cycle: cycle + 1,
                phase: CyclePhase::Fixation,
            },
            Running {
                phase: CyclePhase::Checkerboard,
                ..
            } => Completed,
            Idle | Waiting | Completed | Cancelled(_) => return None,
        })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Waiting => write!(f, "waiting for start"),
            RunState::Instruction => write!(f, "instruction"),
            RunState::Running { cycle, phase } => {
                write!(f, "cycle {} {}", cycle, PhaseKind::from(*phase))
            }
            RunState::Completed => write!(f, "completed"),
            RunState::Cancelled(reason) => write!(f, "cancelled ({:?})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_alternate_then_complete() {
        let mut state = RunState::Instruction;
        let mut seen = Vec::new();
        while let Some(next) = state.next(2) {
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                RunState::Running { cycle: 1, phase: CyclePhase::Fixation },
                RunState::Running { cycle: 1, phase: CyclePhase::Checkerboard },
                RunState::Running { cycle: 2, phase: CyclePhase::Fixation },
                RunState::Running { cycle: 2, phase: CyclePhase::Checkerboard },
                RunState::Completed,
            ]
        );
    }

    #[test]
    fn terminal_states_have_no_successor() {
        assert_eq!(RunState::Completed.next(5), None);
        assert_eq!(RunState::Cancelled(CancelReason::User).next(5), None);
        assert_eq!(RunState::Waiting.next(5), None);
        assert!(RunState::Cancelled(CancelReason::Resource).is_terminal());
        assert!(!RunState::Waiting.is_terminal());
    }

    #[test]
    fn close_is_idempotent_and_never_negative() {
        let wall = Local::now();
        let mut phase = Phase::open(PhaseKind::Fixation, Some(3), Duration::from_secs(20), 500, wall);
        assert_eq!(phase.actual(), None);
        phase.close(100, wall);
        assert_eq!(phase.actual(), Some(Duration::ZERO));
        phase.close(9_000, wall);
        assert_eq!(phase.end, Some(500));
        assert_eq!(phase.label(), "cycle 3 fixation");
    }
}
