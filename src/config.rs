use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::classifier::download;
use crate::device::{ComputeCapability, DevicePolicy};

/// Text column read when neither `--column` nor TONESCOPE_TEXT_COLUMN is set.
pub const DEFAULT_TEXT_COLUMN: &str = "sentence";

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// Directory containing tokenizer.json and the ONNX heads
    pub model_dir: PathBuf,
    /// Base URL `download-model` fetches from
    pub model_url: Option<String>,
    pub text_column: String,
    /// Overrides the batch size derived from the device
    pub batch_size: Option<usize>,
    /// Skip accelerator detection entirely
    pub force_cpu: bool,
    /// Overrides the detected accelerator memory (GiB)
    pub accelerator_memory_gb: Option<f64>,
    /// Whether the exported heads take a `token_type_ids` input
    pub token_type_ids: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default, so this only fails on values that are
    /// set but unparseable.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let batch_size = var("TONESCOPE_BATCH_SIZE")
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("TONESCOPE_BATCH_SIZE must be a positive integer, got '{v}'"))
            })
            .transpose()?;
        if batch_size == Some(0) {
            anyhow::bail!("TONESCOPE_BATCH_SIZE must be at least 1");
        }

        let accelerator_memory_gb = var("TONESCOPE_ACCELERATOR_MEMORY_GB")
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .with_context(|| format!("TONESCOPE_ACCELERATOR_MEMORY_GB must be a number, got '{v}'"))
            })
            .transpose()?;

        Ok(Self {
            db_path: var("TONESCOPE_DB_PATH").unwrap_or_else(|| "./tonescope.db".to_string()),
            model_dir: var("TONESCOPE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(download::default_model_dir),
            model_url: var("TONESCOPE_MODEL_URL"),
            text_column: var("TONESCOPE_TEXT_COLUMN")
                .unwrap_or_else(|| DEFAULT_TEXT_COLUMN.to_string()),
            batch_size,
            force_cpu: var("TONESCOPE_FORCE_CPU").is_some_and(|v| parse_flag(&v)),
            accelerator_memory_gb,
            token_type_ids: var("TONESCOPE_TOKEN_TYPE_IDS").map_or(true, |v| parse_flag(&v)),
        })
    }

    /// Check that the tokenizer and both heads are in the model directory.
    /// Call this before loading models.
    pub fn require_models(&self) -> Result<()> {
        let missing = download::missing_files(&self.model_dir);
        if !missing.is_empty() {
            anyhow::bail!(
                "Model files not found in {}: {}\n\
                 Run `tonescope download-model` to download them.",
                self.model_dir.display(),
                missing.join(", ")
            );
        }
        Ok(())
    }

    /// Check that a download source is configured.
    pub fn require_model_url(&self) -> Result<&str> {
        self.model_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "TONESCOPE_MODEL_URL not set. Point it at a directory serving \
                 tokenizer.json, tone.onnx and hate.onnx."
            )
        })
    }

    /// Probe the device, honouring the CPU and memory overrides.
    pub fn detect_capability(&self) -> ComputeCapability {
        ComputeCapability::detect(self.force_cpu, self.accelerator_memory_gb)
    }

    /// Policy for `capability`, with the batch size override applied.
    /// `cli_batch_size` wins over TONESCOPE_BATCH_SIZE.
    pub fn device_policy(&self, capability: &ComputeCapability, cli_batch_size: Option<usize>) -> DevicePolicy {
        let policy = DevicePolicy::from_capability(capability);
        match cli_batch_size.or(self.batch_size) {
            Some(n) => policy.with_batch_size(n),
            None => policy,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
