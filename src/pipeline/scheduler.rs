// Batch scheduling: clean the dataset, split it into contiguous batches and
// run them one at a time.
//
// Batches run strictly sequentially and in input order. Only one batch's
// tensors are alive at any point, which keeps peak accelerator memory at a
// single batch's footprint no matter how large the dataset is.

use std::ops::Range;

use tracing::{debug, info};

use crate::classifier::RawPrediction;
use crate::dataset::{self, Dataset, RawRecord};
use crate::device::DevicePolicy;

use super::{ModelHandles, PipelineError, Result};

/// Receives `(current, total)` after each batch completes. `current` is 1-based.
pub trait ProgressSink {
    fn batch_done(&mut self, current: usize, total: usize);
}

/// Discards progress updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn batch_done(&mut self, _current: usize, _total: usize) {}
}

/// Split `len` items into contiguous ranges of `batch_size` (the last one
/// possibly shorter). A batch size of 0 is treated as 1.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Cleaned records and their predictions, index-aligned.
#[derive(Debug)]
pub struct ScheduledRun {
    pub records: Vec<RawRecord>,
    pub predictions: Vec<RawPrediction>,
    pub batches: usize,
}

pub struct BatchScheduler {
    policy: DevicePolicy,
}

impl BatchScheduler {
    pub fn new(policy: DevicePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DevicePolicy {
        self.policy
    }

    pub fn total_batches(&self, records: usize) -> usize {
        records.div_ceil(self.policy.batch_size.max(1))
    }

    /// Clean `dataset` on `column`, then classify every surviving record.
    ///
    /// Validation happens before the first batch: a missing column, an empty
    /// dataset, or an all-blank column fails without touching the models.
    pub fn run(
        &self,
        dataset: &Dataset,
        column: &str,
        models: &mut ModelHandles,
        progress: &mut dyn ProgressSink,
    ) -> Result<ScheduledRun> {
        let records = dataset::clean(dataset, column)?;
        let precision = self.policy.precision;

        let predictions = self.drive(&records, progress, |_, batch| {
            let texts: Vec<&str> = batch.iter().map(|r| r.text.as_str()).collect();
            let encoded = models.tokenizer.encode_batch(&texts)?;
            models.engine.infer(encoded, precision)
        })?;

        Ok(ScheduledRun {
            batches: self.total_batches(records.len()),
            records,
            predictions,
        })
    }

    /// Call `step` once per batch, in order, and concatenate its outputs.
    ///
    /// `step` receives the 0-based batch index and the batch's records, and
    /// must return exactly one output per record.
    pub fn drive<T, F>(
        &self,
        records: &[RawRecord],
        progress: &mut dyn ProgressSink,
        mut step: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(usize, &[RawRecord]) -> Result<Vec<T>>,
    {
        let ranges = partition(records.len(), self.policy.batch_size);
        let total = ranges.len();
        info!(
            records = records.len(),
            batches = total,
            batch_size = self.policy.batch_size,
            precision = %self.policy.precision,
            "Starting batched inference"
        );

        let mut outputs = Vec::with_capacity(records.len());
        for (i, range) in ranges.into_iter().enumerate() {
            let expected = range.len();
            let batch_out = step(i, &records[range])?;
            if batch_out.len() != expected {
                return Err(PipelineError::inference(format!(
                    "batch {} produced {} predictions for {} records",
                    i + 1,
                    batch_out.len(),
                    expected
                )));
            }
            outputs.extend(batch_out);

            debug!(batch = i + 1, total, "Batch complete");
            progress.batch_done(i + 1, total);
        }

        Ok(outputs)
    }
}
