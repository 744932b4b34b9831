// Device profiling: derive a batch size and precision mode from the
// compute resources available to this process.
//
// Detection never fails. A missing driver, a missing `nvidia-smi`, or an
// ONNX Runtime build without CUDA all collapse to "no accelerator", which is
// a supported configuration (CPU, full precision, small batches).

use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

/// Accelerator memory (GiB) at or above which batches of 16 are used.
const LARGE_MEMORY_GB: f64 = 8.0;
/// Accelerator memory (GiB) at or above which batches of 8 are used.
const MEDIUM_MEMORY_GB: f64 = 4.0;

const LARGE_BATCH: usize = 16;
const MEDIUM_BATCH: usize = 8;
const SMALL_BATCH: usize = 4;

/// Numeric precision the classification heads run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    /// 32-bit floats end to end.
    Full,
    /// Half-precision heads (only selected when an accelerator is present).
    Reduced,
}

impl std::fmt::Display for PrecisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full (f32)"),
            Self::Reduced => write!(f, "reduced (f16)"),
        }
    }
}

/// Snapshot of the compute resources visible to this process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeCapability {
    /// Whether a CUDA-capable accelerator is usable by ONNX Runtime.
    pub accelerator: bool,
    /// Total addressable accelerator memory in GiB (0 without an accelerator).
    pub memory_gb: f64,
    /// Device name as reported by the driver, if known.
    pub device_name: Option<String>,
}

impl ComputeCapability {
    /// CPU-only capability.
    pub fn cpu() -> Self {
        Self {
            accelerator: false,
            memory_gb: 0.0,
            device_name: None,
        }
    }

    /// An accelerator with the given amount of memory.
    pub fn accelerator(memory_gb: f64) -> Self {
        Self {
            accelerator: true,
            memory_gb,
            device_name: None,
        }
    }

    /// Probe the runtime for an accelerator.
    ///
    /// `force_cpu` skips probing entirely. `memory_override_gb` replaces the
    /// detected memory size when an accelerator is found.
    pub fn detect(force_cpu: bool, memory_override_gb: Option<f64>) -> Self {
        let _span = tracing::info_span!("device_detect").entered();

        if force_cpu {
            debug!("CPU execution forced by configuration");
            return Self::cpu();
        }

        if !cuda_provider_available() {
            info!("No CUDA execution provider available, using CPU");
            return Self::cpu();
        }

        let (device_name, detected_gb) = match query_nvidia_smi() {
            Some((name, gb)) => (Some(name), gb),
            None => (None, 0.0),
        };
        let memory_gb = memory_override_gb.unwrap_or(detected_gb);

        info!(
            device = device_name.as_deref().unwrap_or("unknown"),
            memory_gb, "Accelerator detected"
        );

        Self {
            accelerator: true,
            memory_gb,
            device_name,
        }
    }
}

impl std::fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.accelerator {
            return write!(f, "CPU");
        }
        match &self.device_name {
            Some(name) => write!(f, "GPU {} ({:.1} GB)", name, self.memory_gb),
            None => write!(f, "GPU ({:.1} GB)", self.memory_gb),
        }
    }
}

/// Batch size and precision for one pipeline run. Immutable once derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DevicePolicy {
    pub precision: PrecisionMode,
    pub batch_size: usize,
}

impl DevicePolicy {
    /// Derive the policy from a capability snapshot.
    ///
    /// Monotonic in memory: more accelerator memory never yields a smaller
    /// batch. Reduced precision is only chosen when an accelerator exists.
    pub fn from_capability(capability: &ComputeCapability) -> Self {
        if !capability.accelerator {
            return Self {
                precision: PrecisionMode::Full,
                batch_size: SMALL_BATCH,
            };
        }

        let batch_size = if capability.memory_gb >= LARGE_MEMORY_GB {
            LARGE_BATCH
        } else if capability.memory_gb >= MEDIUM_MEMORY_GB {
            MEDIUM_BATCH
        } else {
            SMALL_BATCH
        };

        Self {
            precision: PrecisionMode::Reduced,
            batch_size,
        }
    }

    /// Replace the batch size (clamped to at least 1), keeping the precision.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }
}

fn cuda_provider_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            debug!(error = %e, "Could not query CUDA execution provider");
            false
        }
    }
}

/// Ask the NVIDIA driver for the first device's name and total memory.
fn query_nvidia_smi() -> Option<(String, f64)> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `name, memory_mib` from the first line of nvidia-smi CSV output.
/// Returns memory in GiB.
fn parse_nvidia_smi(stdout: &str) -> Option<(String, f64)> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, mib) = line.rsplit_once(',')?;
    let mib: f64 = mib.trim().parse().ok()?;
    Some((name.trim().to_string(), mib / 1024.0))
}
