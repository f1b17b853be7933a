//! Model downloading and caching adapter.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use mood_lens_core::{ModelLocation, ModelUnit};

/// Checksum manifest published next to the weights, in `sha256sum` format.
pub const CHECKSUMS_FILE: &str = "SHA256SUMS";

/// Progress reporting hook: `(unit name, bytes so far, total bytes if known)`.
pub type ProgressCallback = Box<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

/// Returns the models directory path.
///
/// Uses `XDG_DATA_HOME/mood-lens/models` or `~/.local/share/mood-lens/models`.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mood-lens")
        .join("models")
}

/// Path of one unit's weights inside `dir`.
#[must_use]
pub fn model_path(dir: &Path, unit: ModelUnit) -> PathBuf {
    dir.join(unit.file_name())
}

/// Lists every unit with whether its file exists in `dir`.
#[must_use]
pub fn list_models(dir: &Path) -> Vec<(ModelUnit, bool)> {
    ModelUnit::ALL
        .iter()
        .map(|&unit| (unit, model_path(dir, unit).exists()))
        .collect()
}

/// Checks if all models are installed in `dir`.
#[must_use]
pub fn all_models_installed(dir: &Path) -> bool {
    list_models(dir).iter().all(|(_, installed)| *installed)
}

/// Turns a configured model location into a local directory.
///
/// Directories are used as they are. URLs are downloaded into `cache_dir`
/// first, skipping files already present.
///
/// # Errors
///
/// Returns an error if a download fails or a checksum does not match.
pub fn resolve_location(
    location: &ModelLocation,
    cache_dir: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<PathBuf> {
    match location {
        ModelLocation::Directory(dir) => Ok(dir.clone()),
        ModelLocation::Url(base) => ensure_models_from(base, cache_dir, progress),
    }
}

/// Ensures every unit exists in `dir`, downloading missing ones from `base_url`.
///
/// Downloads are verified against `base_url/SHA256SUMS`. A server without that
/// manifest is accepted with a warning, but a unit missing from a manifest
/// that does exist is refused.
///
/// # Errors
///
/// Returns an error if:
/// - The models directory cannot be created
/// - The checksum manifest cannot be fetched
/// - A model download fails
/// - A model's checksum doesn't match
pub fn ensure_models_from(
    base_url: &str,
    dir: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create models directory {}", dir.display()))?;

    let base_url = base_url.trim_end_matches('/');
    let missing: Vec<ModelUnit> = ModelUnit::ALL
        .into_iter()
        .filter(|&unit| {
            let present = model_path(dir, unit).exists();
            if present {
                debug!(%unit, "Model already present");
            }
            !present
        })
        .collect();
    if missing.is_empty() {
        return Ok(dir.to_path_buf());
    }

    let checksums = fetch_checksums(base_url)?;
    let base = ModelLocation::Url(base_url.to_string());
    for unit in missing {
        let expected = match &checksums {
            Some(sums) => Some(sums.get(&unit.file_name()).map(String::as_str).with_context(
                || format!("{CHECKSUMS_FILE} at {base_url} has no entry for {}", unit.file_name()),
            )?),
            None => None,
        };
        download_model(unit, expected, &base.resolve(unit), &model_path(dir, unit), progress)?;
    }

    Ok(dir.to_path_buf())
}

/// Fetches the checksum manifest, or `None` if the server has none.
fn fetch_checksums(base_url: &str) -> Result<Option<HashMap<String, String>>> {
    let url = format!("{base_url}/{CHECKSUMS_FILE}");
    let response =
        reqwest::blocking::get(&url).with_context(|| format!("Failed to fetch {url}"))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        warn!("{url} not found, downloads will not be verified");
        return Ok(None);
    }
    if !response.status().is_success() {
        bail!("Fetching {url} failed with status: {}", response.status());
    }
    let text = response
        .text()
        .with_context(|| format!("Failed to read {url}"))?;
    Ok(Some(parse_checksums(&text)))
}

/// Parses `sha256sum` output: `<hex digest>  <file name>` per line.
///
/// Binary-mode markers (`*name`) are accepted. Malformed lines are skipped.
#[must_use]
pub fn parse_checksums(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (digest, name) = line.trim().split_once(char::is_whitespace)?;
            let name = name.trim_start().trim_start_matches('*');
            let valid = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
            (valid && !name.is_empty()).then(|| (name.to_string(), digest.to_ascii_lowercase()))
        })
        .collect()
}

/// Streams one model into a `.part` file, hashing as it goes, then renames it
/// into place.
fn download_model(
    unit: ModelUnit,
    expected: Option<&str>,
    url: &str,
    path: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<()> {
    let name = unit.name();
    info!(unit = name, url, "Downloading model");

    let mut response =
        reqwest::blocking::get(url).with_context(|| format!("Failed to download {name}"))?;
    if !response.status().is_success() {
        bail!("Download of {name} failed with status: {}", response.status());
    }
    let total = response.content_length();

    let partial = path.with_extension("safetensors.part");
    let mut writer = BufWriter::new(
        File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?,
    );
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;

    loop {
        let n = response
            .read(&mut buf)
            .with_context(|| format!("Failed to read response for {name}"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer
            .write_all(&buf[..n])
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        written += n as u64;
        if let Some(report) = progress {
            report(name, written, total);
        }
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    drop(writer);

    let actual = format!("{:x}", hasher.finalize());
    if let Err(e) = check_digest(name, expected, &actual) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    info!(unit = name, bytes = written, "Downloaded model");
    Ok(())
}

/// Compares a computed digest against the known one, if any.
fn check_digest(name: &str, expected: Option<&str>, actual: &str) -> Result<()> {
    match expected {
        None => {
            debug!(unit = name, "No known checksum, skipping verification");
            Ok(())
        }
        Some(expected) if expected.eq_ignore_ascii_case(actual) => Ok(()),
        Some(expected) => bail!(
            "Checksum mismatch for {name}: expected {expected}, got {actual}. \
             Re-run `mood-lens models fetch` to download a fresh copy."
        ),
    }
}
