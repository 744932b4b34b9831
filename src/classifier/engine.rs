// Dual-head inference: run the tone and hate heads over the same batch and
// reduce each head's logits to a class per record.

use std::path::Path;

use tracing::debug;

use crate::device::{DevicePolicy, PrecisionMode};
use crate::labels::{HateCategory, ToneLabel};
use crate::pipeline::{PipelineError, Result};

use super::heads::ClassificationHead;
use super::onnx::{HeadOptions, OnnxHead};
use super::tokenize::EncodedBatch;

/// File stem of the tone head inside the model directory.
pub const TONE_HEAD: &str = "tone";
/// File stem of the hate head inside the model directory.
pub const HATE_HEAD: &str = "hate";

/// Arg-max output of both heads for one record, before reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPrediction {
    pub tone: ToneLabel,
    pub hate: HateCategory,
}

pub struct DualHeadInferenceEngine {
    tone: Box<dyn ClassificationHead>,
    hate: Box<dyn ClassificationHead>,
}

impl DualHeadInferenceEngine {
    /// Pair two heads. Their class counts must match the label vocabularies.
    pub fn new(tone: Box<dyn ClassificationHead>, hate: Box<dyn ClassificationHead>) -> Result<Self> {
        check_label_count(tone.as_ref(), ToneLabel::COUNT)?;
        check_label_count(hate.as_ref(), HateCategory::COUNT)?;
        Ok(Self { tone, hate })
    }

    /// Load both ONNX heads from `model_dir` according to the device policy.
    pub fn load(
        model_dir: &Path,
        policy: &DevicePolicy,
        accelerator: bool,
        token_type_ids: bool,
    ) -> Result<Self> {
        let options = HeadOptions {
            accelerator,
            precision: policy.precision,
            token_type_ids,
        };
        let tone = OnnxHead::load(model_dir, TONE_HEAD, ToneLabel::COUNT, options)?;
        let hate = OnnxHead::load(model_dir, HATE_HEAD, HateCategory::COUNT, options)?;
        Self::new(Box::new(tone), Box::new(hate))
    }

    /// Classify one batch.
    ///
    /// The batch is consumed: its tensors and both heads' logits are dropped
    /// before this returns, so memory after each call is back at baseline.
    /// Any failure is fatal to the run; there is no per-record recovery.
    pub fn infer(&mut self, batch: EncodedBatch, precision: PrecisionMode) -> Result<Vec<RawPrediction>> {
        let tone_classes = self.run_head(HeadSlot::Tone, &batch, precision)?;
        let hate_classes = self.run_head(HeadSlot::Hate, &batch, precision)?;
        let rows = batch.batch_size;
        drop(batch);

        let predictions = tone_classes
            .into_iter()
            .zip(hate_classes)
            .map(|(t, h)| {
                let tone = ToneLabel::from_index(t).ok_or_else(|| {
                    PipelineError::inference(format!("tone head produced class {t}"))
                })?;
                let hate = HateCategory::from_index(h).ok_or_else(|| {
                    PipelineError::inference(format!("hate head produced class {h}"))
                })?;
                Ok(RawPrediction { tone, hate })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(rows, "Batch classified");
        Ok(predictions)
    }

    fn run_head(&mut self, slot: HeadSlot, batch: &EncodedBatch, precision: PrecisionMode) -> Result<Vec<usize>> {
        let head = match slot {
            HeadSlot::Tone => self.tone.as_mut(),
            HeadSlot::Hate => self.hate.as_mut(),
        };

        let logits = head.forward(batch, precision)?;
        if logits.rows() != batch.batch_size || logits.classes() != head.num_labels() {
            return Err(PipelineError::inference(format!(
                "{} head returned logits of shape [{}, {}], expected [{}, {}]",
                head.name(),
                logits.rows(),
                logits.classes(),
                batch.batch_size,
                head.num_labels()
            )));
        }
        Ok(logits.argmax())
    }
}

#[derive(Clone, Copy)]
enum HeadSlot {
    Tone,
    Hate,
}

fn check_label_count(head: &dyn ClassificationHead, expected: usize) -> Result<()> {
    if head.num_labels() != expected {
        return Err(PipelineError::model_load(format!(
            "{} head has {} labels, expected {}",
            head.name(),
            head.num_labels(),
            expected
        )));
    }
    Ok(())
}
