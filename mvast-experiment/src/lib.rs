pub mod config;
pub mod input;
pub mod recorder;
pub mod sequencer;
#[cfg(feature = "serial")]
pub mod serial;
pub mod trigger;

pub use config::{RunConfig, CONFIG_FILE, MAX_CYCLES, MAX_PHASE_SECONDS};
pub use input::{matches_symbol, KeyboardQueue, SymbolSource, CANCEL_KEY, START_KEY};
pub use recorder::{CycleRecord, RunSummary, TimingRecorder, ToggleRecord};
pub use sequencer::TaskSequencer;
#[cfg(feature = "serial")]
pub use serial::SerialSource;
pub use trigger::{TriggerChannel, TriggerDetector};
