pub mod flicker;
pub mod scheduler;
pub mod stats;
pub mod timer;

pub use flicker::{FlickerEngine, FlickerReport, Toggle};
pub use scheduler::{PhaseScheduler, COARSE_POLL_INTERVAL, FLICKER_POLL_INTERVAL};
pub use stats::{TickStats, TickSummary};
pub use timer::{Clock, MonotonicClock, SimulatedClock};
