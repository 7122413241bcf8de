use mvast_core::{ColorScheme, StartMode, TaskError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "mvast_fmri_task_config.json";

/// Longest phase a run may plan, in seconds.
pub const MAX_PHASE_SECONDS: f64 = 86_400.0;

/// Most fixation/checkerboard cycles a run may plan.
pub const MAX_CYCLES: usize = 10_000;

pub const DEFAULT_INSTRUCTION_TEXT: &str = "For the next several minutes, you will see a fixation cross alternate with a flashing checkerboard.


Please keep your eyes open and fixed on the center of the screen.


The task will start shortly.";

/// Immutable settings for one run.
///
/// Durations are seconds and frequencies Hz, as written in the JSON file. Keys missing
/// from the file take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub trigger_character: char,
    pub start_mode: StartMode,
    pub color_scheme: ColorScheme,
    pub use_serial_port: bool,
    pub serial_port: Option<String>,
    pub serial_baud_rate: u32,
    pub images_dir: PathBuf,
    pub fixation_image: Option<String>,
    pub checkerboard_image1: Option<String>,
    pub checkerboard_image2: Option<String>,
    pub instruction_image: Option<String>,
    pub instruction_text: Option<String>,
    pub font_path: Option<PathBuf>,
    pub instruction_duration: f64,
    pub fixation_duration: f64,
    pub checkerboard_duration: f64,
    pub flash_frequency: f64,
    pub cycle_count: usize,
    pub drift_threshold_ms: f64,
    pub timing_log: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trigger_character: '=',
            start_mode: StartMode::Both,
            color_scheme: ColorScheme::BlueYellow,
            use_serial_port: false,
            serial_port: None,
            serial_baud_rate: 9600,
            images_dir: PathBuf::from("images"),
            fixation_image: None,
            checkerboard_image1: None,
            checkerboard_image2: None,
            instruction_image: None,
            instruction_text: None,
            font_path: None,
            instruction_duration: 10.0,
            fixation_duration: 20.0,
            checkerboard_duration: 20.0,
            flash_frequency: 8.0,
            cycle_count: 5,
            drift_threshold_ms: 100.0,
            timing_log: None,
        }
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, TaskError> {
    if value > MAX_PHASE_SECONDS {
        return Err(TaskError::Configuration(format!(
            "{name} = {value} exceeds {MAX_PHASE_SECONDS} s"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| TaskError::Configuration(format!("{name} = {value}: {e}")))
}

impl RunConfig {
    /// Loads `path`, or writes the defaults there when it does not exist yet.
    ///
    /// A file that exists but cannot be parsed is an error; defaults are never
    /// substituted for a broken file.
    pub fn load_or_create(path: &Path) -> Result<Self, TaskError> {
        if !path.exists() {
            let config = RunConfig::default();
            config.save(path)?;
            log::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, TaskError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            TaskError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), TaskError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Checks every timing-relevant field. Must pass before any phase is opened.
    pub fn validate(&self) -> Result<(), TaskError> {
        for (name, value) in [
            ("fixation_duration", self.fixation_duration),
            ("checkerboard_duration", self.checkerboard_duration),
            ("flash_frequency", self.flash_frequency),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TaskError::Configuration(format!(
                    "{name} must be > 0, got {value}"
                )));
            }
        }
        if !self.instruction_duration.is_finite() || self.instruction_duration < 0.0 {
            return Err(TaskError::Configuration(format!(
                "instruction_duration must be >= 0, got {}",
                self.instruction_duration
            )));
        }
        // one flip per phase at the very least
        if 0.5 / self.flash_frequency > MAX_PHASE_SECONDS {
            return Err(TaskError::Configuration(format!(
                "flash_frequency {} Hz is too low, half period exceeds {MAX_PHASE_SECONDS} s",
                self.flash_frequency
            )));
        }
        if !(1..=MAX_CYCLES).contains(&self.cycle_count) {
            return Err(TaskError::Configuration(format!(
                "cycle_count must be in 1..={MAX_CYCLES}, got {}",
                self.cycle_count
            )));
        }
        if !self.drift_threshold_ms.is_finite() || self.drift_threshold_ms < 0.0 {
            return Err(TaskError::Configuration(format!(
                "drift_threshold_ms must be >= 0, got {}",
                self.drift_threshold_ms
            )));
        }
        if self.trigger_character.is_control() {
            return Err(TaskError::Configuration(format!(
                "trigger_character {:?} is a control character",
                self.trigger_character
            )));
        }
        if self.use_serial_port && self.serial_port.as_deref().is_none_or(str::is_empty) {
            return Err(TaskError::Configuration(
                "use_serial_port is set but serial_port is empty".into(),
            ));
        }
        self.durations().map(|_| ())
    }

    fn durations(&self) -> Result<[Duration; 3], TaskError> {
        Ok([
            seconds("instruction_duration", self.instruction_duration)?,
            seconds("fixation_duration", self.fixation_duration)?,
            seconds("checkerboard_duration", self.checkerboard_duration)?,
        ])
    }

    // The accessors below assume `validate()` passed.

    pub fn instruction(&self) -> Duration {
        Duration::from_secs_f64(self.instruction_duration)
    }

    pub fn fixation(&self) -> Duration {
        Duration::from_secs_f64(self.fixation_duration)
    }

    pub fn checkerboard(&self) -> Duration {
        Duration::from_secs_f64(self.checkerboard_duration)
    }

    /// Planned length of the whole run from trigger to completion.
    pub fn expected_total(&self) -> Duration {
        self.instruction() + (self.fixation() + self.checkerboard()) * self.cycle_count as u32
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.images_dir.join(path)
        }
    }

    /// Checkerboard image paths, falling back to the colour scheme's file names.
    pub fn checkerboard_paths(&self) -> [PathBuf; 2] {
        let defaults = self.color_scheme.checkerboard_files();
        [
            self.resolve(self.checkerboard_image1.as_deref().unwrap_or(defaults[0])),
            self.resolve(self.checkerboard_image2.as_deref().unwrap_or(defaults[1])),
        ]
    }

    pub fn fixation_path(&self) -> Option<PathBuf> {
        self.fixation_image.as_deref().map(|n| self.resolve(n))
    }

    pub fn instruction_path(&self) -> Option<PathBuf> {
        self.instruction_image.as_deref().map(|n| self.resolve(n))
    }

    pub fn instruction_text(&self) -> &str {
        self.instruction_text
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTION_TEXT)
    }

    /// Text for the waiting screen, naming the active start channels.
    pub fn waiting_message(&self) -> String {
        let c = self.trigger_character;
        match self.start_mode {
            StartMode::Manual => "fMRI Visual Task - Ready to Start\n\n\
                 Waiting for manual start...\n\n\
                 Press SPACEBAR to start\n\n\
                 Press ESC to cancel"
                .to_string(),
            StartMode::Trigger => format!(
                "fMRI Visual Task - Ready to Start\n\n\
                 Waiting for scanner trigger signal...\n\n\
                 Trigger character: '{c}'\n\n\
                 Press ESC to cancel"
            ),
            StartMode::Both => format!(
                "fMRI Visual Task - Ready to Start\n\n\
                 Waiting for start signal...\n\n\
                 Press SPACEBAR to start manually\nOR\n\
                 Wait for scanner trigger signal (character: '{c}')\n\n\
                 Press ESC to cancel"
            ),
        }
    }

    /// Timing log destination; defaults to a timestamped file in the working directory.
    pub fn timing_log_path(&self, now: &chrono::DateTime<chrono::Local>) -> PathBuf {
        self.timing_log.clone().unwrap_or_else(|| {
            PathBuf::from(format!("timing_log_{}.json", now.format("%Y%m%d_%H%M%S")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.expected_total(), Duration::from_secs(210));
    }

    #[test]
    fn non_positive_durations_are_rejected() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = RunConfig {
                fixation_duration: bad,
                ..RunConfig::default()
            };
            assert!(matches!(config.validate(), Err(TaskError::Configuration(_))));
        }

        let config = RunConfig {
            flash_frequency: 0.0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            cycle_count: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            use_serial_port: true,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn extreme_values_are_rejected_before_arithmetic() {
        for config in [
            RunConfig {
                flash_frequency: 1e-11,
                ..RunConfig::default()
            },
            RunConfig {
                checkerboard_duration: 2e10,
                ..RunConfig::default()
            },
            RunConfig {
                instruction_duration: MAX_PHASE_SECONDS + 1.0,
                ..RunConfig::default()
            },
            RunConfig {
                cycle_count: MAX_CYCLES + 1,
                ..RunConfig::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(TaskError::Configuration(_))));
        }

        let longest = RunConfig {
            instruction_duration: MAX_PHASE_SECONDS,
            fixation_duration: MAX_PHASE_SECONDS,
            checkerboard_duration: MAX_PHASE_SECONDS,
            cycle_count: MAX_CYCLES,
            ..RunConfig::default()
        };
        longest.validate().unwrap();
        assert_eq!(
            longest.expected_total(),
            Duration::from_secs(86_400 * (1 + 2 * MAX_CYCLES as u64))
        );
    }

    #[test]
    fn zero_instruction_is_allowed() {
        let config = RunConfig {
            instruction_duration: 0.0,
            ..RunConfig::default()
        };
        config.validate().unwrap();
        let config = RunConfig {
            instruction_duration: -0.5,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"start_mode": "manual", "color_scheme": "black_white", "cycle_count": 2}"#,
        )
        .unwrap();

        let config = RunConfig::load_or_create(&path).unwrap();
        assert_eq!(config.start_mode, StartMode::Manual);
        assert_eq!(config.cycle_count, 2);
        assert_eq!(config.trigger_character, '=');
        assert_eq!(
            config.checkerboard_paths()[0],
            PathBuf::from("images").join("acheck_bw.png")
        );
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let config = RunConfig::load_or_create(&path).unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(path.exists());
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn broken_file_is_an_error_not_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"start_mode": "sometimes"}"#).unwrap();
        assert!(matches!(
            RunConfig::load_or_create(&path),
            Err(TaskError::Configuration(_))
        ));
    }

    #[test]
    fn explicit_and_absolute_image_names() {
        let abs = std::env::temp_dir().join("board.png");
        let config = RunConfig {
            checkerboard_image1: Some(abs.to_string_lossy().into_owned()),
            checkerboard_image2: Some("other.png".into()),
            images_dir: PathBuf::from("assets"),
            ..RunConfig::default()
        };
        let [first, second] = config.checkerboard_paths();
        assert_eq!(first, abs);
        assert_eq!(second, PathBuf::from("assets").join("other.png"));
    }

    #[test]
    fn waiting_message_names_active_channels() {
        let manual = RunConfig {
            start_mode: StartMode::Manual,
            ..RunConfig::default()
        };
        assert!(manual.waiting_message().contains("SPACEBAR"));
        assert!(!manual.waiting_message().contains("'='"));

        let trigger = RunConfig {
            start_mode: StartMode::Trigger,
            trigger_character: 't',
            ..RunConfig::default()
        };
        assert!(trigger.waiting_message().contains("'t'"));
        assert!(!trigger.waiting_message().contains("SPACEBAR"));
    }
}
