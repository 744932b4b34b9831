// Classification head trait: the seam between the scheduler and a model.
//
// The production implementation runs an exported ONNX sequence classifier
// (see onnx.rs). Tests substitute scripted heads so the pipeline can run
// without model files.

use crate::device::PrecisionMode;
use crate::pipeline::{PipelineError, Result};

use super::tokenize::EncodedBatch;

/// Row-major `[rows, classes]` logits from one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    rows: usize,
    classes: usize,
    values: Vec<f32>,
}

impl Logits {
    /// Wrap a flat logit buffer. The buffer length must equal `rows * classes`.
    pub fn new(rows: usize, classes: usize, values: Vec<f32>) -> Result<Self> {
        if classes == 0 || values.len() != rows * classes {
            return Err(PipelineError::inference(format!(
                "logit buffer of length {} does not fit shape [{}, {}]",
                values.len(),
                rows,
                classes
            )));
        }
        Ok(Self {
            rows,
            classes,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.classes..(i + 1) * self.classes]
    }

    /// Index of the highest logit in each row. Ties resolve to the lowest
    /// index; NaN never wins, and an all-NaN row resolves to 0.
    pub fn argmax(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|i| {
                let row = self.row(i);
                let mut best = 0;
                for (j, &v) in row.iter().enumerate().skip(1) {
                    if !v.is_nan() && (row[best].is_nan() || v > row[best]) {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }
}

/// A sequence-classification head.
///
/// `forward` takes `&mut self` because ONNX Runtime sessions need exclusive
/// access to run. Heads are `Send` so a loaded engine can be moved onto a
/// blocking worker thread.
pub trait ClassificationHead: Send {
    /// Short name for logs and error messages ("tone", "hate").
    fn name(&self) -> &str;

    /// Number of classes this head emits per row.
    fn num_labels(&self) -> usize;

    /// Run one batch. No gradient state exists in inference-only runtimes;
    /// every allocation tied to the batch must be released before returning.
    fn forward(&mut self, batch: &EncodedBatch, precision: PrecisionMode) -> Result<Logits>;
}
