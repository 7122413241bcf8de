use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input channel a start signal arrived on, in arbitration priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriggerSource {
    Manual,
    Keyboard,
    SerialPort,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Manual => write!(f, "manual"),
            TriggerSource::Keyboard => write!(f, "keyboard trigger"),
            TriggerSource::SerialPort => write!(f, "serial port trigger"),
        }
    }
}

/// The single event that moves a run from Waiting to Instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub source: TriggerSource,
    pub symbol: char,
    pub timestamp: u64,
    pub wall_clock: DateTime<Local>,
}

/// Which start channels are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Start key only; hardware channels are ignored even if present.
    Manual,
    /// Trigger character (keyboard or serial) only.
    Trigger,
    #[default]
    Both,
}

impl StartMode {
    pub fn accepts_manual(&self) -> bool {
        matches!(self, StartMode::Manual | StartMode::Both)
    }

    pub fn accepts_trigger(&self) -> bool {
        matches!(self, StartMode::Trigger | StartMode::Both)
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMode::Manual => write!(f, "manual"),
            StartMode::Trigger => write!(f, "trigger"),
            StartMode::Both => write!(f, "both"),
        }
    }
}
