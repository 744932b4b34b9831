// Classification pipeline: clean → batch → dual-head inference → reconcile →
// annotate, with an optional best-effort write to the comment store.
//
// Model handles are built once by the caller and passed in, so the same
// pipeline runs against ONNX heads in production and scripted heads in tests.

pub mod error;
pub mod persist;
pub mod reconcile;
pub mod scheduler;

pub use error::{PipelineError, Result};
pub use persist::{PersistReport, PersistenceWarning};
pub use reconcile::ClassifiedRecord;
pub use scheduler::{BatchScheduler, NoProgress, ProgressSink};

use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;
use tracing::info;

use crate::classifier::download::TOKENIZER_FILE;
use crate::classifier::{DualHeadInferenceEngine, TokenizationAdapter};
use crate::dataset::Dataset;
use crate::device::DevicePolicy;

/// Columns appended to the output table, in order.
pub const TONE_PREDICTION_COLUMN: &str = "tone_prediction";
pub const CLASS_PREDICTION_COLUMN: &str = "class_prediction";
pub const TONE_NAME_COLUMN: &str = "tone_name";
pub const HATE_NAME_COLUMN: &str = "hate_name";

/// Tokenizer and both heads, loaded once per process.
pub struct ModelHandles {
    pub tokenizer: TokenizationAdapter,
    pub engine: DualHeadInferenceEngine,
}

impl ModelHandles {
    pub fn new(tokenizer: TokenizationAdapter, engine: DualHeadInferenceEngine) -> Self {
        Self { tokenizer, engine }
    }

    /// Load `tokenizer.json` and both ONNX heads from `model_dir`.
    pub fn load(
        model_dir: &Path,
        policy: &DevicePolicy,
        accelerator: bool,
        token_type_ids: bool,
    ) -> Result<Self> {
        let tokenizer = TokenizationAdapter::from_file(&model_dir.join(TOKENIZER_FILE))?;
        let engine = DualHeadInferenceEngine::load(model_dir, policy, accelerator, token_type_ids)?;
        info!(model_dir = %model_dir.display(), "Models loaded");
        Ok(Self::new(tokenizer, engine))
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Cleaned rows with the four prediction columns appended.
    pub table: Dataset,
    pub records: Vec<ClassifiedRecord>,
    pub batches: usize,
    pub policy: DevicePolicy,
    /// `None` when no store was given.
    pub persistence: Option<PersistReport>,
}

/// Run the whole pipeline over `dataset`.
///
/// Input, model, and inference failures abort the run. Persistence failures
/// never do; they come back in `persistence.warnings`.
pub fn analyze(
    dataset: &Dataset,
    column: &str,
    policy: DevicePolicy,
    models: &mut ModelHandles,
    store: Option<&Connection>,
    progress: &mut dyn ProgressSink,
) -> Result<AnalysisOutcome> {
    let scheduler = BatchScheduler::new(policy);
    let run = scheduler.run(dataset, column, models, progress)?;

    let records = reconcile::reconcile_all(run.records, run.predictions);
    let overridden = records.iter().filter(|r| r.overridden()).count();
    info!(records = records.len(), overridden, "Predictions reconciled");

    let table = annotate(dataset, &records);
    let persistence = store.map(|conn| persist::persist(conn, &records));

    Ok(AnalysisOutcome {
        table,
        records,
        batches: run.batches,
        policy,
        persistence,
    })
}

/// Build the output table: one row per classified record, original columns
/// untouched, prediction columns appended.
pub fn annotate(dataset: &Dataset, records: &[ClassifiedRecord]) -> Dataset {
    let rows = records
        .iter()
        .filter_map(|r| {
            let mut row = dataset.rows().get(r.record.position)?.clone();
            row.insert(TONE_PREDICTION_COLUMN.into(), Value::from(r.tone.index()));
            row.insert(CLASS_PREDICTION_COLUMN.into(), Value::from(r.hate.index()));
            row.insert(TONE_NAME_COLUMN.into(), Value::from(r.tone_name()));
            row.insert(HATE_NAME_COLUMN.into(), Value::from(r.hate_name()));
            Some(row)
        })
        .collect();

    let mut columns: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| !is_prediction_column(c))
        .cloned()
        .collect();
    columns.extend(
        [
            TONE_PREDICTION_COLUMN,
            CLASS_PREDICTION_COLUMN,
            TONE_NAME_COLUMN,
            HATE_NAME_COLUMN,
        ]
        .map(String::from),
    );

    Dataset::with_columns(columns, rows)
}

fn is_prediction_column(name: &str) -> bool {
    matches!(
        name,
        TONE_PREDICTION_COLUMN | CLASS_PREDICTION_COLUMN | TONE_NAME_COLUMN | HATE_NAME_COLUMN
    )
}
