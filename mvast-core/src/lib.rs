pub mod error;
pub mod phase;
pub mod stimulus;
pub mod timing;
pub mod trigger;

pub use error::TaskError;
pub use phase::{CancelReason, CyclePhase, Phase, PhaseKind, RunState};
pub use stimulus::{CheckerImage, ColorScheme, Stimulus, StimulusDisplay};
pub use timing::{format_wall_clock, TimingLogEntry, WALL_CLOCK_FORMAT};
pub use trigger::{StartMode, TriggerEvent, TriggerSource};
