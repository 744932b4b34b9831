// Model download helper.
//
// The fine-tuned heads are not public checkpoints, so there is no built-in
// source: TONESCOPE_MODEL_URL must point at a directory (HTTP) that serves
// `tokenizer.json`, `tone.onnx` and `hate.onnx`, and optionally the
// `*_fp16.onnx` half-precision exports.
//
// Files are stored in a platform-appropriate directory
// (~/.local/share/tonescope/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::engine::{HATE_HEAD, TONE_HEAD};

pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/tonescope/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tonescope")
        .join("models")
}

/// Files every run needs, in download order.
pub fn required_files() -> [String; 3] {
    [
        TOKENIZER_FILE.to_string(),
        format!("{TONE_HEAD}.onnx"),
        format!("{HATE_HEAD}.onnx"),
    ]
}

/// Half-precision exports, used on accelerators when present.
pub fn half_precision_files() -> [String; 2] {
    [format!("{TONE_HEAD}_fp16.onnx"), format!("{HATE_HEAD}_fp16.onnx")]
}

/// Required files missing from `dir`.
pub fn missing_files(dir: &Path) -> Vec<String> {
    required_files()
        .into_iter()
        .filter(|f| !dir.join(f).exists())
        .collect()
}

/// Check whether the tokenizer and both heads exist.
pub fn model_files_present(dir: &Path) -> bool {
    missing_files(dir).is_empty()
}

/// Whether both half-precision exports exist.
pub fn half_precision_present(dir: &Path) -> bool {
    half_precision_files().iter().all(|f| dir.join(f).exists())
}

/// Download the model files from `base_url` into `dir`.
///
/// Skips files that already exist. With `include_fp16`, also fetches the
/// half-precision exports.
pub async fn download_models(base_url: &str, dir: &Path, include_fp16: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    let base_url = base_url.trim_end_matches('/');
    let client = reqwest::Client::new();

    let mut files: Vec<String> = required_files().to_vec();
    if include_fp16 {
        files.extend(half_precision_files());
    }

    for file in &files {
        let dest = dir.join(file);
        if dest.exists() {
            info!(file = file.as_str(), "Model file already exists, skipping");
            println!("  {} (already exists)", file);
            continue;
        }

        println!("  Downloading {}...", file);
        let show_progress = file.ends_with(".onnx");
        download_file(&client, &format!("{base_url}/{file}"), &dest, show_progress).await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        let pb = match response.content_length() {
            Some(size) => {
                let pb = ProgressBar::new(size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .expect("valid template")
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("    {spinner} {bytes}")
                        .expect("valid template"),
                );
                pb
            }
        };
        Some(pb)
    } else {
        None
    };

    // A partial file never carries the final name.
    let partial = dest.with_extension("part");
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read response body")?
    {
        body.extend_from_slice(&chunk);
        if let Some(ref pb) = pb {
            pb.set_position(body.len() as u64);
        }
    }

    std::fs::write(&partial, &body)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move {} into place", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
