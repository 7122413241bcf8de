use crate::config::RunConfig;
use crate::input::{matches_symbol, SymbolSource, START_KEY};
use chrono::{DateTime, Local};
use mvast_core::{StartMode, TaskError, TriggerEvent, TriggerSource};

/// Upper bound on serial symbols consumed per poll, so a flooded line cannot stall a tick.
const MAX_SERIAL_READS_PER_POLL: usize = 64;

/// One start channel.
pub enum TriggerChannel {
    /// Designated start key.
    Manual { key: char },
    /// Trigger character arriving as a keystroke.
    Keyboard { symbol: char },
    /// Trigger character arriving on a byte stream. `source` is `None` once the
    /// channel has failed; it then never matches again.
    SerialPort {
        symbol: char,
        source: Option<Box<dyn SymbolSource>>,
    },
}

impl TriggerChannel {
    pub fn source(&self) -> TriggerSource {
        match self {
            TriggerChannel::Manual { .. } => TriggerSource::Manual,
            TriggerChannel::Keyboard { .. } => TriggerSource::Keyboard,
            TriggerChannel::SerialPort { .. } => TriggerSource::SerialPort,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, TriggerChannel::SerialPort { source: None, .. })
    }

    fn poll(&mut self, keys: &[char]) -> Option<char> {
        match self {
            TriggerChannel::Manual { key } => keys.contains(key).then_some(*key),
            TriggerChannel::Keyboard { symbol } => {
                keys.iter().copied().find(|c| matches_symbol(*c, *symbol))
            }
            TriggerChannel::SerialPort { symbol, source } => {
                let reader = source.as_mut()?;
                for _ in 0..MAX_SERIAL_READS_PER_POLL {
                    match reader.read_pending_symbol() {
                        Ok(Some(c)) if matches_symbol(c, *symbol) => return Some(c),
                        Ok(Some(_)) => continue,
                        Ok(None) => return None,
                        Err(err) => {
                            log::warn!("{}; channel disabled for the rest of the run", err);
                            *source = None;
                            return None;
                        }
                    }
                }
                None
            }
        }
    }
}

impl std::fmt::Debug for TriggerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerChannel::Manual { key } => f.debug_struct("Manual").field("key", key).finish(),
            TriggerChannel::Keyboard { symbol } => {
                f.debug_struct("Keyboard").field("symbol", symbol).finish()
            }
            TriggerChannel::SerialPort { symbol, source } => f
                .debug_struct("SerialPort")
                .field("symbol", symbol)
                .field("enabled", &source.is_some())
                .finish(),
        }
    }
}

/// Polls the active start channels in fixed priority order (Manual, Keyboard,
/// SerialPort). The first match wins; after that the detector stays silent.
#[derive(Debug)]
pub struct TriggerDetector {
    mode: StartMode,
    symbol: char,
    channels: Vec<TriggerChannel>,
    fired: bool,
}

impl TriggerDetector {
    pub fn new(mode: StartMode, symbol: char) -> Self {
        let mut channels = Vec::new();
        if mode.accepts_manual() {
            channels.push(TriggerChannel::Manual { key: START_KEY });
        }
        if mode.accepts_trigger() {
            channels.push(TriggerChannel::Keyboard { symbol });
        }
        Self {
            mode,
            symbol,
            channels,
            fired: false,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.start_mode, config.trigger_character)
    }

    /// Adds the serial channel. An open failure is reported once and leaves the
    /// channel in place but permanently non-matching.
    pub fn with_serial(mut self, source: Result<Box<dyn SymbolSource>, TaskError>) -> Self {
        if !self.mode.accepts_trigger() {
            log::info!("start mode is {}; serial trigger input ignored", self.mode);
            return self;
        }
        let source = match source {
            Ok(source) => Some(source),
            Err(err) => {
                log::warn!("{}; continuing without serial triggers", err);
                None
            }
        };
        self.channels.push(TriggerChannel::SerialPort {
            symbol: self.symbol,
            source,
        });
        self
    }

    pub fn sources(&self) -> Vec<TriggerSource> {
        self.channels.iter().map(TriggerChannel::source).collect()
    }

    pub fn channels(&self) -> &[TriggerChannel] {
        &self.channels
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// `keys` are the keystrokes drained this tick.
    pub fn poll(
        &mut self,
        keys: &[char],
        timestamp: u64,
        wall_clock: DateTime<Local>,
    ) -> Option<TriggerEvent> {
        if self.fired {
            return None;
        }
        for channel in &mut self.channels {
            if let Some(symbol) = channel.poll(keys) {
                self.fired = true;
                return Some(TriggerEvent {
                    source: channel.source(),
                    symbol,
                    timestamp,
                    wall_clock,
                });
            }
        }
        None
    }
}
