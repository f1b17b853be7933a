//! Run command - live emotion detection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

use mood_lens_adapters::models::{models_dir, resolve_location};
use mood_lens_adapters::RasterOverlay;
use mood_lens_core::controller::{DEFAULT_FPS, DEFAULT_MIN_CONFIDENCE};
use mood_lens_core::inference::CandleBackend;
use mood_lens_core::ports::{DEFAULT_IOU_THRESHOLD, DEFAULT_SCORE_THRESHOLD};
use mood_lens_core::{
    CameraDevice, ControllerConfig, DetectorOptions, DisplaySize, EmotionController, EventSink,
    LensError, ModelLocation, RunSummary,
};

use super::models::download_progress;
use super::ExitCode;
use crate::config::AppConfig;
use crate::output::{JsonEvents, StatusLine};

/// How lifecycle events are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Live status line on stderr
    #[default]
    Text,
    /// JSON Lines on stdout, one object per event
    Jsonl,
}

/// Hardcoded default values.
mod defaults {
    pub const MODELS: &str = "models";
    pub const PREVIEW_EVERY: u64 = 30;
}

/// Parse and validate a value in 0.0-1.0.
fn parse_unit_interval(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0.0..=1.0"))
    }
}

/// Shared arguments for a live run.
#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Camera device index
    #[arg(long, value_name = "INDEX")]
    pub device: Option<u32>,

    /// Model directory or http(s) base URL
    #[arg(long, value_name = "DIR|URL")]
    pub models: Option<String>,

    /// Minimum face confidence (0.0-1.0)
    #[arg(long, value_parser = parse_unit_interval)]
    pub score_threshold: Option<f32>,

    /// Non-maximum suppression overlap (0.0-1.0)
    #[arg(long, value_parser = parse_unit_interval)]
    pub iou_threshold: Option<f32>,

    /// Overlay width in pixels (defaults to the camera's)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Overlay height in pixels (defaults to the camera's)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,

    /// Inference refreshes per second
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: Option<u32>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Clear the label when no face is visible instead of keeping the last one
    #[arg(long)]
    pub reset_on_empty: bool,

    /// Minimum score for an expression bar to be drawn (0.0-1.0)
    #[arg(long, value_parser = parse_unit_interval)]
    pub min_confidence: Option<f32>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write the composited overlay to this PNG file
    #[arg(long, value_name = "PATH")]
    pub preview: Option<PathBuf>,

    /// Write the preview every N frames
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub preview_every: Option<u64>,

    /// Seconds to wait for the camera stream
    #[arg(long, value_name = "SECS")]
    pub camera_timeout: Option<u64>,

    /// Seconds to wait for each model unit
    #[arg(long, value_name = "SECS")]
    pub model_timeout: Option<u64>,

    /// Read settings from this file instead of the XDG and project files
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Label policy from the config file; `--reset-on-empty` wins.
    #[arg(skip)]
    retain_on_empty: Option<bool>,
}

/// Settings after layering defaults, config files and flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub device: u32,
    pub models: String,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: u32,
    pub frames: Option<u64>,
    pub retain_on_empty: bool,
    pub min_confidence: f32,
    pub format: OutputFormat,
    pub preview: Option<PathBuf>,
    pub preview_every: u64,
    pub camera_timeout_secs: Option<u64>,
    pub model_timeout_secs: Option<u64>,
}

impl RunArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (in [`RunArgs::settings`])
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        args.device = args.device.or(config.camera.device);
        args.camera_timeout = args.camera_timeout.or(config.camera.timeout_secs);
        if args.models.is_none() {
            args.models.clone_from(&config.models.location);
        }
        args.model_timeout = args.model_timeout.or(config.models.timeout_secs);

        args.score_threshold = args.score_threshold.or(config.detector.score_threshold);
        args.iou_threshold = args.iou_threshold.or(config.detector.iou_threshold);

        args.width = args.width.or(config.display.width);
        args.height = args.height.or(config.display.height);
        args.fps = args.fps.or(config.display.fps);

        // CLI --reset-on-empty always wins; otherwise config decides.
        args.retain_on_empty = if args.reset_on_empty {
            Some(false)
        } else {
            config.emotion.retain_on_empty
        };
        args.min_confidence = args.min_confidence.or(config.emotion.min_confidence);

        if args.format.is_none() {
            args.format = config
                .output
                .format
                .as_ref()
                .and_then(|s| OutputFormat::from_str(s, true).ok());
        }
        if args.preview.is_none() {
            args.preview.clone_from(&config.output.preview);
        }
        args.preview_every = args.preview_every.or(config.output.preview_every);

        args
    }

    /// Resolves every setting, falling back to hardcoded defaults.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            device: self.device.unwrap_or(0),
            models: self
                .models
                .clone()
                .unwrap_or_else(|| defaults::MODELS.to_string()),
            score_threshold: self.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
            iou_threshold: self.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            width: self.width,
            height: self.height,
            fps: self.fps.unwrap_or(DEFAULT_FPS),
            frames: self.frames,
            retain_on_empty: if self.reset_on_empty {
                false
            } else {
                self.retain_on_empty.unwrap_or(true)
            },
            min_confidence: self.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            format: self.format.unwrap_or_default(),
            preview: self.preview.clone(),
            preview_every: self.preview_every.unwrap_or(defaults::PREVIEW_EVERY),
            camera_timeout_secs: self.camera_timeout,
            model_timeout_secs: self.model_timeout,
        }
    }
}

impl Settings {
    /// Overlay size when both dimensions are set; otherwise the camera's is used.
    fn display_size(&self) -> Option<DisplaySize> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(DisplaySize::new(width, height)),
            _ => None,
        }
    }

    /// Rejects an overlay size given in one dimension only.
    fn check(&self) -> Result<()> {
        match (self.width, self.height) {
            (Some(width), None) => {
                bail!("overlay width {width} given without a height; set --height or display.height")
            }
            (None, Some(height)) => {
                bail!("overlay height {height} given without a width; set --width or display.width")
            }
            _ => Ok(()),
        }
    }

    fn controller_config(&self, models: ModelLocation) -> ControllerConfig {
        ControllerConfig {
            models,
            detector: DetectorOptions {
                score_threshold: self.score_threshold,
                iou_threshold: self.iou_threshold,
            },
            display_size: self.display_size(),
            camera_timeout: self.camera_timeout_secs.map(Duration::from_secs),
            model_timeout: self.model_timeout_secs.map(Duration::from_secs),
            refresh_interval: ControllerConfig::interval_for_fps(self.fps),
            max_frames: self.frames,
            retain_label_on_empty: self.retain_on_empty,
            min_expression_confidence: self.min_confidence,
        }
    }
}

/// Run the live loop until Ctrl-C, the frame limit, or a startup failure.
///
/// Startup failures are reported and mapped to their exit code; only
/// unexpected errors are returned.
pub fn run(args: &RunArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    let settings = RunArgs::with_config(args.clone(), &config).settings();

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(ExitCode::Success);
    }
    settings.check()?;

    let location = prepare_models(&settings)?;
    let backend = CandleBackend::new();
    info!(device = backend.device_name(), models = %location, "Starting");

    let mut overlay = RasterOverlay::new(settings.display_size().unwrap_or(DisplaySize::new(1, 1)));
    if let Some(path) = &settings.preview {
        overlay = overlay.with_preview(path, settings.preview_every);
    }

    let events: Arc<dyn EventSink> = match settings.format {
        OutputFormat::Text => Arc::new(StatusLine::new()),
        OutputFormat::Jsonl => Arc::new(JsonEvents::stdout()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let controller_config = settings.controller_config(location);
    let outcome = runtime.block_on(drive(
        camera(settings.device),
        backend,
        overlay,
        Arc::clone(&events),
        controller_config,
    ));

    match outcome {
        Ok(summary) => {
            if settings.format == OutputFormat::Text {
                report(&summary);
            }
            Ok(ExitCode::Success)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(&e))
        }
    }
}

/// Downloads URL locations into the local model store.
fn prepare_models(settings: &Settings) -> Result<ModelLocation> {
    let location = ModelLocation::parse(&settings.models);
    if let ModelLocation::Url(_) = location {
        let (pb, progress) = download_progress()?;
        let dir = resolve_location(&location, &models_dir(), Some(&progress))?;
        pb.finish_and_clear();
        debug!(dir = %dir.display(), "Models cached");
        return Ok(ModelLocation::Directory(dir));
    }
    Ok(location)
}

#[cfg(feature = "camera-nokhwa")]
fn camera(index: u32) -> mood_lens_adapters::NokhwaCamera {
    mood_lens_adapters::nokhwa_camera(index)
}

#[cfg(not(feature = "camera-nokhwa"))]
const fn camera(index: u32) -> mood_lens_adapters::UnsupportedCamera {
    mood_lens_adapters::UnsupportedCamera::new(index)
}

/// Runs the controller, cancelling it on Ctrl-C.
async fn drive<D: CameraDevice>(
    device: D,
    backend: CandleBackend,
    overlay: RasterOverlay,
    events: Arc<dyn EventSink>,
    config: ControllerConfig,
) -> Result<RunSummary, LensError> {
    let mut controller =
        EmotionController::new(config, device, Arc::new(backend), overlay).with_events(events);
    let handle = controller.handle();

    let run = controller.run();
    tokio::pin!(run);
    tokio::select! {
        result = &mut run => return result,
        interrupted = tokio::signal::ctrl_c() => {
            if interrupted.is_ok() {
                info!("Interrupted, stopping");
            }
            handle.cancel();
        }
    }
    run.await
}

fn report(summary: &RunSummary) {
    let label = if summary.last_label.is_empty() {
        "none"
    } else {
        summary.last_label.as_str()
    };
    eprintln!(
        "Processed {} frames ({} failed), last emotion: {label}",
        summary.frames_processed, summary.frame_errors
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        Harness::try_parse_from(std::iter::once("mood-lens").chain(args.iter().copied()))
            .unwrap()
            .run
    }

    fn config(toml: &str) -> AppConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]).settings();
        assert_eq!(settings.device, 0);
        assert_eq!(settings.models, "models");
        assert_eq!(settings.score_threshold, DEFAULT_SCORE_THRESHOLD);
        assert_eq!(settings.fps, DEFAULT_FPS);
        assert!(settings.retain_on_empty);
        assert_eq!(settings.format, OutputFormat::Text);
        assert!(settings.display_size().is_none());
    }

    #[test]
    fn test_cli_beats_config() {
        let config = config(
            r"
[detector]
score_threshold = 0.5
iou_threshold = 0.2

[display]
fps = 15
",
        );
        let args = parse(&["--score-threshold", "0.9"]);
        let settings = RunArgs::with_config(args, &config).settings();
        assert_eq!(settings.score_threshold, 0.9);
        assert_eq!(settings.iou_threshold, 0.2);
        assert_eq!(settings.fps, 15);
    }

    #[test]
    fn test_label_policy_layering() {
        let keep = config("[emotion]\nretain_on_empty = true\n");
        let settings = RunArgs::with_config(parse(&["--reset-on-empty"]), &keep).settings();
        assert!(!settings.retain_on_empty);

        let reset = config("[emotion]\nretain_on_empty = false\n");
        let settings = RunArgs::with_config(parse(&[]), &reset).settings();
        assert!(!settings.retain_on_empty);
    }

    #[test]
    fn test_config_format_is_case_insensitive() {
        let jsonl = config("[output]\nformat = 'JSONL'\n");
        let settings = RunArgs::with_config(parse(&[]), &jsonl).settings();
        assert_eq!(settings.format, OutputFormat::Jsonl);
    }

    #[test]
    fn test_controller_config_from_settings() {
        let settings = parse(&[
            "--width", "640", "--height", "480", "--fps", "20", "--frames", "5",
            "--camera-timeout", "3",
        ])
        .settings();
        let cfg = settings.controller_config(ModelLocation::parse("/m"));
        assert_eq!(cfg.display_size, Some(DisplaySize::new(640, 480)));
        assert_eq!(cfg.refresh_interval, Duration::from_millis(50));
        assert_eq!(cfg.max_frames, Some(5));
        assert_eq!(cfg.camera_timeout, Some(Duration::from_secs(3)));
        assert!(cfg.model_timeout.is_none());
    }

    #[test]
    fn test_lone_dimension_is_rejected() {
        let err = parse(&["--width", "640"]).settings().check().unwrap_err();
        assert!(err.to_string().contains("without a height"));

        let height_only = config("[display]\nheight = 480\n");
        let settings = RunArgs::with_config(parse(&[]), &height_only).settings();
        assert!(settings.check().unwrap_err().to_string().contains("without a width"));

        let split = RunArgs::with_config(parse(&["--width", "640"]), &height_only).settings();
        assert!(split.check().is_ok());
        assert_eq!(split.display_size(), Some(DisplaySize::new(640, 480)));
    }

    #[test]
    fn test_threshold_parser_rejects_out_of_range() {
        assert!(parse_unit_interval("0.3").is_ok());
        assert_eq!(parse_unit_interval("2").unwrap_err(), "2 is not in 0.0..=1.0");
        assert!(parse_unit_interval("abc").unwrap_err().contains("not a valid number"));
    }

    #[test]
    fn test_directory_models_are_not_downloaded() {
        let settings = parse(&["--models", "/opt/weights"]).settings();
        assert_eq!(
            prepare_models(&settings).unwrap(),
            ModelLocation::Directory(PathBuf::from("/opt/weights"))
        );
    }
}
