//! CLI command definitions and handlers.

pub mod cameras;
pub mod models;
pub mod run;

use clap::{Parser, Subcommand};
use mood_lens_core::LensError;

/// Mood Lens - live facial emotion display
#[derive(Parser)]
#[command(name = "mood-lens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared run arguments (camera, models, thresholds, output).
    #[command(flatten)]
    pub run: run::RunArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run live emotion detection (the default)
    Run(run::RunArgs),
    /// Manage ML models
    Models(models::ModelsArgs),
    /// List available cameras
    Cameras,
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Unexpected failure.
    Error,
    /// Camera access denied, missing or timed out.
    CameraUnavailable,
    /// A model unit failed to load.
    ModelLoad,
}

impl ExitCode {
    const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::CameraUnavailable => 2,
            Self::ModelLoad => 3,
        }
    }
}

impl From<&LensError> for ExitCode {
    fn from(err: &LensError) -> Self {
        match err {
            LensError::CameraUnavailable(_) => Self::CameraUnavailable,
            LensError::ModelLoad { .. } => Self::ModelLoad,
            LensError::FrameNotReady | LensError::Frame(_) | LensError::Inference(_) => {
                Self::Error
            }
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mood_lens_core::ModelUnit;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_startup_errors_map_to_distinct_codes() {
        assert_eq!(
            ExitCode::from(&LensError::camera_unavailable("denied")),
            ExitCode::CameraUnavailable
        );
        assert_eq!(
            ExitCode::from(&LensError::model_load(ModelUnit::Detector, "missing")),
            ExitCode::ModelLoad
        );
        assert_eq!(
            ExitCode::from(&LensError::Inference("x".into())),
            ExitCode::Error
        );
        assert_eq!(ExitCode::ModelLoad.code(), 3);
    }
}
