// ONNX classification head: a fine-tuned BERT-style sequence classifier
// exported to ONNX, run through ONNX Runtime.
//
// Output 0 is the `[batch, num_labels]` logits tensor. Reduced precision
// loads the `*_fp16.onnx` export when one exists; those exports may emit
// either f16 or f32 logits, so both are accepted in that mode.

use std::path::{Path, PathBuf};

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use crate::device::PrecisionMode;
use crate::pipeline::{PipelineError, Result};

use super::heads::{ClassificationHead, Logits};
use super::tokenize::EncodedBatch;

/// How a head's session is built.
#[derive(Debug, Clone, Copy)]
pub struct HeadOptions {
    /// Register the CUDA execution provider (CPU stays as fallback).
    pub accelerator: bool,
    /// Prefer the half-precision export when present.
    pub precision: PrecisionMode,
    /// Whether the export takes a `token_type_ids` input.
    pub token_type_ids: bool,
}

pub struct OnnxHead {
    name: String,
    session: Session,
    num_labels: usize,
    token_type_ids: bool,
}

impl OnnxHead {
    /// Load `<model_dir>/<name>.onnx` (or `<name>_fp16.onnx` in reduced mode).
    pub fn load(model_dir: &Path, name: &str, num_labels: usize, options: HeadOptions) -> Result<Self> {
        let model_path = resolve_model_path(model_dir, name, options.precision);

        if !model_path.exists() {
            return Err(PipelineError::model_load(format!(
                "{} head not found: {}\nRun `tonescope download-model` to fetch it.",
                name,
                model_path.display()
            )));
        }

        let session = if options.accelerator {
            Session::builder()
                .map_err(|e| load_error(name, &model_path, e))?
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| load_error(name, &model_path, e))?
                .commit_from_file(&model_path)
                .map_err(|e| load_error(name, &model_path, e))?
        } else {
            Session::builder()
                .map_err(|e| load_error(name, &model_path, e))?
                .commit_from_file(&model_path)
                .map_err(|e| load_error(name, &model_path, e))?
        };

        debug!(
            head = name,
            path = %model_path.display(),
            accelerator = options.accelerator,
            "Loaded classification head"
        );

        Ok(Self {
            name: name.to_string(),
            session,
            num_labels,
            token_type_ids: options.token_type_ids,
        })
    }
}

fn load_error(name: &str, path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::model_load(format!(
        "failed to load {} head from {}: {}",
        name,
        path.display(),
        e
    ))
}

fn tensor_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::inference(format!("failed to build input tensor: {e}"))
}

/// Pick the model file for a head, preferring the f16 export in reduced mode.
pub fn resolve_model_path(model_dir: &Path, name: &str, precision: PrecisionMode) -> PathBuf {
    let full = model_dir.join(format!("{name}.onnx"));
    if precision == PrecisionMode::Reduced {
        let half = model_dir.join(format!("{name}_fp16.onnx"));
        if half.exists() {
            return half;
        }
    }
    full
}

impl ClassificationHead for OnnxHead {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn forward(&mut self, batch: &EncodedBatch, precision: PrecisionMode) -> Result<Logits> {
        let shape = batch.shape();

        let input_ids = Tensor::from_array((shape, batch.input_ids.clone())).map_err(tensor_error)?;
        let attention_mask =
            Tensor::from_array((shape, batch.attention_mask.clone())).map_err(tensor_error)?;

        // The session outputs borrow the session; they are dropped at the end
        // of this block so nothing batch-sized outlives the call.
        let values = {
            let run_result = if self.token_type_ids {
                let token_type_ids = Tensor::from_array((shape, batch.token_type_ids.clone()))
                    .map_err(tensor_error)?;
                self.session.run(ort::inputs! {
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                    "token_type_ids" => token_type_ids
                })
            } else {
                self.session.run(ort::inputs! {
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask
                })
            };
            let outputs = run_result.map_err(|e| {
                PipelineError::inference(format!("{} head forward pass failed: {}", self.name, e))
            })?;

            let output = &outputs[0];
            let extracted = match precision {
                PrecisionMode::Reduced => match output.try_extract_tensor::<half::f16>() {
                    Ok((_shape, data)) => Ok(data.iter().map(|v| v.to_f32()).collect::<Vec<f32>>()),
                    Err(_) => output
                        .try_extract_tensor::<f32>()
                        .map(|(_shape, data)| data.to_vec()),
                },
                PrecisionMode::Full => output
                    .try_extract_tensor::<f32>()
                    .map(|(_shape, data)| data.to_vec()),
            };
            extracted.map_err(|e| {
                PipelineError::inference(format!("failed to read {} logits: {}", self.name, e))
            })?
        };

        Logits::new(batch.batch_size, self.num_labels, values)
    }
}
