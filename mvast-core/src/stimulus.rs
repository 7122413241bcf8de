use crate::error::TaskError;
use serde::{Deserialize, Serialize};

/// One of the two phase-inverted checkerboard images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckerImage {
    First,
    Second,
}

impl CheckerImage {
    pub fn from_index(index: usize) -> Self {
        if index % 2 == 0 {
            CheckerImage::First
        } else {
            CheckerImage::Second
        }
    }

    pub fn index(&self) -> usize {
        match self {
            CheckerImage::First => 0,
            CheckerImage::Second => 1,
        }
    }
}

/// Opaque "show stimulus X" instruction handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stimulus {
    WaitingForStart,
    Instruction,
    Fixation,
    Checkerboard(CheckerImage),
    Complete,
}

impl Stimulus {
    pub const ALL: [Stimulus; 6] = [
        Stimulus::WaitingForStart,
        Stimulus::Instruction,
        Stimulus::Fixation,
        Stimulus::Checkerboard(CheckerImage::First),
        Stimulus::Checkerboard(CheckerImage::Second),
        Stimulus::Complete,
    ];

    /// Stable slot index for pre-rendered frame caches.
    pub fn cache_id(&self) -> usize {
        match self {
            Stimulus::WaitingForStart => 0,
            Stimulus::Instruction => 1,
            Stimulus::Fixation => 2,
            Stimulus::Checkerboard(img) => 3 + img.index(),
            Stimulus::Complete => 5,
        }
    }

    /// Stimuli that must be loaded before the run may leave Idle.
    pub fn required() -> [Stimulus; 5] {
        [
            Stimulus::WaitingForStart,
            Stimulus::Instruction,
            Stimulus::Fixation,
            Stimulus::Checkerboard(CheckerImage::First),
            Stimulus::Checkerboard(CheckerImage::Second),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    /// Blue background, yellow foreground.
    #[default]
    BlueYellow,
    /// Black background, white foreground.
    BlackWhite,
}

impl ColorScheme {
    pub fn background(&self) -> [u8; 4] {
        match self {
            ColorScheme::BlueYellow => [0, 0, 255, 255],
            ColorScheme::BlackWhite => [0, 0, 0, 255],
        }
    }

    pub fn foreground(&self) -> [u8; 4] {
        match self {
            ColorScheme::BlueYellow => [255, 255, 0, 255],
            ColorScheme::BlackWhite => [255, 255, 255, 255],
        }
    }

    /// Default checkerboard file names for this scheme.
    pub fn checkerboard_files(&self) -> [&'static str; 2] {
        match self {
            ColorScheme::BlueYellow => ["acheck_by.png", "acheck_by_.png"],
            ColorScheme::BlackWhite => ["acheck_bw.png", "acheck_bw_.png"],
        }
    }
}

/// Renderer collaborator. Called only at phase and toggle boundaries.
///
/// `show` is synchronous and must return before the next tick's deadline check.
pub trait StimulusDisplay {
    fn is_ready(&self, stimulus: Stimulus) -> bool;
    fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError>;
}

impl<D: StimulusDisplay + ?Sized> StimulusDisplay for Box<D> {
    fn is_ready(&self, stimulus: Stimulus) -> bool {
        (**self).is_ready(stimulus)
    }

    fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError> {
        (**self).show(stimulus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_ids_are_unique_and_dense() {
        let mut ids: Vec<usize> = Stimulus::ALL.iter().map(Stimulus::cache_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn checker_index_round_trips_through_parity() {
        assert_eq!(CheckerImage::from_index(0), CheckerImage::First);
        assert_eq!(CheckerImage::from_index(1), CheckerImage::Second);
        assert_eq!(CheckerImage::from_index(CheckerImage::Second.index()), CheckerImage::Second);
    }

    #[test]
    fn scheme_parses_from_snake_case() {
        let s: ColorScheme = serde_json::from_str("\"black_white\"").unwrap();
        assert_eq!(s, ColorScheme::BlackWhite);
        assert_eq!(s.checkerboard_files()[1], "acheck_bw_.png");
        assert!(serde_json::from_str::<ColorScheme>("\"purple\"").is_err());
    }
}
