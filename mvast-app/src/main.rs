mod app;
use app::App;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use mvast_core::RunState;
use mvast_experiment::{RunConfig, TaskSequencer, CONFIG_FILE, START_KEY};
use mvast_render::{FrameBufferDisplay, SkiaRenderer};
use mvast_timing::SimulatedClock;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Screen size used when rendering without a window.
const DRY_RUN_SIZE: (u32, u32) = (1280, 720);

#[derive(Parser, Debug)]
#[command(name = "mvast-fmri-task", version, about = "Fixation / flashing checkerboard task for fMRI runs")]
struct Args {
    /// JSON configuration; created with defaults if missing.
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Where to write the timing log (overrides the config file).
    #[arg(long)]
    timing_log: Option<PathBuf>,

    /// Run headless on a simulated clock with an automatic start signal.
    #[arg(long)]
    dry_run: bool,

    /// Open a normal window instead of going fullscreen.
    #[arg(long)]
    windowed: bool,
}

fn log_config(config: &RunConfig) {
    log::info!(
        "Start mode: {}, trigger '{}', serial {}",
        config.start_mode,
        config.trigger_character,
        match (&config.serial_port, config.use_serial_port) {
            (Some(port), true) => format!("{port} @ {} baud", config.serial_baud_rate),
            _ => "off".to_string(),
        }
    );
    log::info!(
        "Timing: instruction {} s, {} cycles of {} s fixation + {} s checkerboard at {} Hz ({:.1} s total)",
        config.instruction_duration,
        config.cycle_count,
        config.fixation_duration,
        config.checkerboard_duration,
        config.flash_frequency,
        config.expected_total().as_secs_f64()
    );
    log::info!(
        "Colour scheme: {:?}, images from {}",
        config.color_scheme,
        config.images_dir.display()
    );
}

fn dry_run(config: RunConfig, timing_log: &Path) -> anyhow::Result<RunState> {
    let start = if config.start_mode.accepts_manual() {
        START_KEY
    } else {
        config.trigger_character
    };
    let (w, h) = DRY_RUN_SIZE;
    let renderer = SkiaRenderer::load(&app::stimulus_sources(&config, w, h));
    let mut sequencer =
        TaskSequencer::new(config, SimulatedClock::new(), FrameBufferDisplay::new(renderer));
    sequencer.keyboard().push(start);

    let outcome = sequencer.run();
    app::save_timing_log(sequencer.recorder(), timing_log)?;
    log::info!("Dry run presented {} frames", sequencer.display().presented());
    Ok(outcome?)
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = RunConfig::load_or_create(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(path) = args.timing_log {
        config.timing_log = Some(path);
    }
    config.validate().context("invalid configuration")?;
    log_config(&config);
    let timing_log = config.timing_log_path(&chrono::Local::now());

    let state = if args.dry_run {
        dry_run(config, &timing_log)?
    } else {
        App::new(config, timing_log, args.windowed).run()?
    };

    log::info!("Run finished: {}", state);
    Ok(if state == RunState::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
