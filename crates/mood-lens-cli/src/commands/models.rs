//! Models command - manage ML models.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mood_lens_adapters::models::{
    ensure_models_from, list_models as adapter_list_models, model_path, models_dir,
    ProgressCallback,
};
use mood_lens_core::ModelLocation;

use crate::config::AppConfig;

/// Arguments for the models command
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Models subcommands
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// Download required models
    Fetch {
        /// Base URL the weights files are fetched from
        /// (defaults to `[models] location` when that is a URL)
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        /// Target directory (defaults to the user data directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// List installed models
    List {
        /// Directory to inspect (defaults to the user data directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Print model directory path
    Path,
}

/// Run the models command.
pub fn run(args: &ModelsArgs) -> Result<()> {
    match &args.command {
        ModelsCommand::Fetch { base_url, dir } => {
            let config = AppConfig::load();
            let base_url = source_url(base_url.as_deref(), config.models.location.as_deref())?;
            fetch_models(&base_url, dir.clone().unwrap_or_else(models_dir))
        }
        ModelsCommand::List { dir } => {
            list_models(&dir.clone().unwrap_or_else(models_dir));
            Ok(())
        }
        ModelsCommand::Path => {
            println!("{}", models_dir().display());
            Ok(())
        }
    }
}

/// Byte-level download progress bar, restarted for each unit.
pub fn download_progress() -> Result<(Arc<ProgressBar>, ProgressCallback)> {
    let pb = Arc::new(ProgressBar::new(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .map_err(|e| anyhow::anyhow!("Invalid progress template: {e}"))?
            .progress_chars("#>-"),
    );

    let current_unit: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let bar = Arc::clone(&pb);

    let progress: ProgressCallback = Box::new(move |name: &str, downloaded: u64, total: Option<u64>| {
        let is_new_unit = {
            let mut current = current_unit
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *current == name {
                false
            } else {
                *current = name.to_string();
                true
            }
        };
        if is_new_unit {
            bar.set_length(total.unwrap_or(0));
            bar.set_message(name.to_string());
        }
        bar.set_position(downloaded);
    });

    Ok((pb, progress))
}

/// Picks the download source: the flag, else a configured URL location.
fn source_url(flag: Option<&str>, configured: Option<&str>) -> Result<String> {
    if let Some(url) = flag {
        return Ok(url.to_string());
    }
    match configured.map(ModelLocation::parse) {
        Some(ModelLocation::Url(url)) => Ok(url),
        _ => bail!(
            "no model source configured; pass --base-url or set [models] location \
             to an http(s) URL in the config file"
        ),
    }
}

fn fetch_models(base_url: &str, dir: PathBuf) -> Result<()> {
    let (pb, progress) = download_progress()?;
    let dir = ensure_models_from(base_url, &dir, Some(&progress))?;
    pb.finish_with_message(format!("All models in {}", dir.display()));
    Ok(())
}

fn list_models(dir: &std::path::Path) {
    let models = adapter_list_models(dir);

    println!("Models directory: {}", dir.display());
    println!();

    for (unit, installed) in &models {
        let status = if *installed { "✓" } else { "✗" };
        let file = model_path(dir, *unit);
        let file_name = file
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        println!("  {status} {unit} ({file_name})");
    }

    println!();
    let installed_count = models.iter().filter(|(_, installed)| *installed).count();
    println!("{}/{} models installed", installed_count, models.len());
}
