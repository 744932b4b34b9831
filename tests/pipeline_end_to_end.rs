// End-to-end pipeline tests: dataset in, annotated table and stored rows out.
//
// No model files are involved: a word-level tokenizer is built in code and the
// two heads are scripted. The "echo" head picks its class from the first
// token id of each row, so "a", "b", "c" classify as 0, 1, 2 and any
// reordering shows up in the output.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::json;

use tonescope::classifier::heads::{ClassificationHead, Logits};
use tonescope::classifier::{DualHeadInferenceEngine, EncodedBatch, TokenizationAdapter};
use tonescope::dataset::Dataset;
use tonescope::db;
use tonescope::device::{DevicePolicy, PrecisionMode};
use tonescope::pipeline::{self, ModelHandles, PipelineError, ProgressSink};

const FIRST_WORD_ID: i64 = 2;

fn tokenizer() -> TokenizationAdapter {
    let words = ["a", "b", "c", "d", "e", "f", "hello", "world"];
    let mut vocab = serde_json::Map::new();
    vocab.insert("[PAD]".into(), 0.into());
    vocab.insert("[UNK]".into(), 1.into());
    for (i, w) in words.iter().enumerate() {
        vocab.insert((*w).to_string(), (i as i64 + FIRST_WORD_ID).into());
    }
    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
    });
    TokenizationAdapter::from_bytes(tokenizer_json.to_string()).unwrap()
}

fn one_hot(rows: usize, classes: usize, winners: impl Iterator<Item = usize>) -> Logits {
    let mut values = vec![0.0; rows * classes];
    for (row, winner) in winners.enumerate() {
        values[row * classes + winner] = 1.0;
    }
    Logits::new(rows, classes, values).unwrap()
}

/// Class = (first token id - 2) mod classes. Records the batch sizes it saw.
struct EchoHead {
    name: &'static str,
    classes: usize,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl ClassificationHead for EchoHead {
    fn name(&self) -> &str {
        self.name
    }
    fn num_labels(&self) -> usize {
        self.classes
    }
    fn forward(&mut self, batch: &EncodedBatch, _precision: PrecisionMode) -> pipeline::Result<Logits> {
        self.batch_sizes.lock().unwrap().push(batch.batch_size);
        let winners = (0..batch.batch_size).map(|i| {
            let first = batch.row_ids(i)[0];
            ((first - FIRST_WORD_ID).max(0) as usize) % self.classes
        });
        Ok(one_hot(batch.batch_size, self.classes, winners))
    }
}

/// Pops one predetermined class per row, across batches.
struct ScriptedHead {
    name: &'static str,
    classes: usize,
    script: VecDeque<usize>,
}

impl ClassificationHead for ScriptedHead {
    fn name(&self) -> &str {
        self.name
    }
    fn num_labels(&self) -> usize {
        self.classes
    }
    fn forward(&mut self, batch: &EncodedBatch, _precision: PrecisionMode) -> pipeline::Result<Logits> {
        let mut winners = Vec::with_capacity(batch.batch_size);
        for _ in 0..batch.batch_size {
            let next = self
                .script
                .pop_front()
                .ok_or_else(|| PipelineError::inference("script exhausted"))?;
            winners.push(next);
        }
        Ok(one_hot(batch.batch_size, self.classes, winners.into_iter()))
    }
}

struct Harness {
    models: ModelHandles,
    tone_batches: Arc<Mutex<Vec<usize>>>,
}

/// Echo tone head plus a scripted hate head.
fn harness(hate_script: &[usize]) -> Harness {
    let tone_batches = Arc::new(Mutex::new(Vec::new()));
    let tone = EchoHead {
        name: "tone",
        classes: 3,
        batch_sizes: Arc::clone(&tone_batches),
    };
    let hate = ScriptedHead {
        name: "hate",
        classes: 6,
        script: hate_script.iter().copied().collect(),
    };
    let engine = DualHeadInferenceEngine::new(Box::new(tone), Box::new(hate)).unwrap();
    Harness {
        models: ModelHandles::new(tokenizer(), engine),
        tone_batches,
    }
}

#[derive(Default)]
struct Recorder(Vec<(usize, usize)>);

impl ProgressSink for Recorder {
    fn batch_done(&mut self, current: usize, total: usize) {
        self.0.push((current, total));
    }
}

fn policy(batch_size: usize) -> DevicePolicy {
    DevicePolicy {
        precision: PrecisionMode::Full,
        batch_size,
    }
}

fn stored_fks(conn: &Connection) -> Vec<(i64, i64)> {
    conn.prepare("SELECT tone_id, hate_id FROM comment ORDER BY id")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

// ============================================================
// Reference scenarios
// ============================================================

#[test]
fn three_records_in_two_batches_persist_expected_foreign_keys() {
    let mut h = harness(&[2, 0, 0]);
    let conn = db::open_in_memory().unwrap();
    let dataset = Dataset::from_texts("sentence", &["a", "b", "c"]);
    let mut progress = Recorder::default();

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        Some(&conn),
        &mut progress,
    )
    .unwrap();

    assert_eq!(*h.tone_batches.lock().unwrap(), vec![2, 1]);
    assert_eq!(progress.0, vec![(1, 2), (2, 2)]);
    assert_eq!(outcome.batches, 2);

    let reconciled: Vec<(usize, usize)> = outcome
        .records
        .iter()
        .map(|r| (r.tone.index(), r.hate.index()))
        .collect();
    assert_eq!(reconciled, vec![(0, 2), (1, 0), (2, 0)]);

    let report = outcome.persistence.unwrap();
    assert!(report.is_complete());
    assert_eq!(stored_fks(&conn), vec![(1, 3), (2, 1), (3, 1)]);
}

#[test]
fn insult_without_category_is_stored_as_other() {
    let mut h = harness(&[0]);
    let conn = db::open_in_memory().unwrap();
    let dataset = Dataset::from_texts("sentence", &["a"]);

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(4),
        &mut h.models,
        Some(&conn),
        &mut pipeline::NoProgress,
    )
    .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.raw_hate.index(), 0);
    assert_eq!(record.tone.index(), 0);
    assert_eq!(record.hate.index(), 5);
    assert_eq!(outcome.table.rows()[0]["hate_name"], json!("Other"));
    assert_eq!(stored_fks(&conn), vec![(1, 6)]);
}

// ============================================================
// Validation happens before any batch
// ============================================================

#[test]
fn missing_column_fails_before_batching() {
    let mut h = harness(&[]);
    let dataset = Dataset::from_texts("body", &["a", "b"]);
    let mut progress = Recorder::default();

    let err = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        None,
        &mut progress,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::InputValidation(_)));
    assert!(h.tone_batches.lock().unwrap().is_empty());
    assert!(progress.0.is_empty());
}

#[test]
fn all_blank_input_is_rejected() {
    let mut h = harness(&[]);
    let dataset = Dataset::from_json_str(
        &json!([{"sentence": ""}, {"sentence": "   "}, {"sentence": null}]).to_string(),
    )
    .unwrap();

    let err = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        None,
        &mut pipeline::NoProgress,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::InputValidation(_)));
    assert!(h.tone_batches.lock().unwrap().is_empty());
}

#[test]
fn blank_rows_are_dropped_and_order_is_kept() {
    let texts = ["c", " ", "a", "b", "", "c", "a", "b", "c"];
    let mut h = harness(&[1; 7]);
    let dataset = Dataset::from_texts("sentence", &texts);

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(3),
        &mut h.models,
        None,
        &mut pipeline::NoProgress,
    )
    .unwrap();

    let tones: Vec<usize> = outcome.records.iter().map(|r| r.tone.index()).collect();
    assert_eq!(tones, vec![2, 0, 1, 2, 0, 1, 2]);

    let positions: Vec<usize> = outcome.records.iter().map(|r| r.record.position).collect();
    assert_eq!(positions, vec![0, 2, 3, 5, 6, 7, 8]);

    let out_text: Vec<&str> = outcome
        .table
        .rows()
        .iter()
        .map(|r| r["sentence"].as_str().unwrap())
        .collect();
    assert_eq!(out_text, vec!["c", "a", "b", "c", "a", "b", "c"]);
    assert_eq!(*h.tone_batches.lock().unwrap(), vec![3, 3, 1]);
    assert!(outcome.persistence.is_none());
}

#[test]
fn inference_failure_aborts_the_run() {
    // Script covers the first batch only
    let mut h = harness(&[1, 1]);
    let conn = db::open_in_memory().unwrap();
    let dataset = Dataset::from_texts("sentence", &["a", "b", "c"]);

    let err = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        Some(&conn),
        &mut pipeline::NoProgress,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::Inference(_)));
    assert!(stored_fks(&conn).is_empty());
}

// ============================================================
// Persistence is best effort
// ============================================================

#[test]
fn one_failing_insert_leaves_the_rest_stored() {
    let mut h = harness(&[3, 3, 3, 3]);
    let conn = db::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_b BEFORE INSERT ON comment
         WHEN NEW.text = 'b'
         BEGIN SELECT RAISE(ABORT, 'row rejected'); END;",
    )
    .unwrap();
    let dataset = Dataset::from_texts("sentence", &["a", "b", "c", "a"]);

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        Some(&conn),
        &mut pipeline::NoProgress,
    )
    .unwrap();

    assert_eq!(outcome.table.len(), 4);
    let report = outcome.persistence.unwrap();
    assert_eq!(report.inserted.len(), 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].position, 1);
    assert_eq!(stored_fks(&conn).len(), 3);
}

#[test]
fn passthrough_columns_survive_and_source_is_stored() {
    let mut h = harness(&[0, 0]);
    let conn = db::open_in_memory().unwrap();
    let dataset = Dataset::from_json_str(
        &json!([
            {"sentence": "hello", "author": "ana", "source": "youtube"},
            {"sentence": "world", "timestamp": "2024-01-01", "likes": 4}
        ])
        .to_string(),
    )
    .unwrap();

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(8),
        &mut h.models,
        Some(&conn),
        &mut pipeline::NoProgress,
    )
    .unwrap();

    let rows = outcome.table.rows();
    assert_eq!(rows[0]["author"], json!("ana"));
    assert_eq!(rows[1]["likes"], json!(4));
    assert_eq!(rows[1]["timestamp"], json!("2024-01-01"));
    assert!(outcome.table.has_column("tone_prediction"));

    let stored = db::queries::list_comments(&conn, &Default::default(), 1, 10).unwrap();
    // Newest first
    assert_eq!(stored[1].source.as_deref(), Some("youtube"));
    assert_eq!(stored[0].source, None);
}

#[test]
fn annotated_table_round_trips_through_json_lines() {
    let mut h = harness(&[2, 4]);
    let dataset = Dataset::from_texts("sentence", &["a", "d"]);

    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(2),
        &mut h.models,
        None,
        &mut pipeline::NoProgress,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("classified.jsonl");
    outcome.table.write(&path).unwrap();

    let reloaded = Dataset::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    let first = &reloaded.rows()[0];
    assert_eq!(first["tone_prediction"], json!(0));
    assert_eq!(first["class_prediction"], json!(2));
    assert_eq!(first["tone_name"], json!("Insult"));
    assert_eq!(first["hate_name"], json!("Homophobia"));
    // "d" echoes to class 3 mod 3 = 0 (Insult), hate 4 (Lookism) kept
    let second = &reloaded.rows()[1];
    assert_eq!(second["tone_name"], json!("Insult"));
    assert_eq!(second["hate_name"], json!("Lookism"));
}

#[test]
fn csv_input_is_annotated_with_prediction_columns_last() {
    let mut h = harness(&[3, 0]);
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("comments.csv");
    std::fs::write(&input, "sentence,likes,author\na,7,ann\n,0,bo\nc,2,cy\n").unwrap();

    let dataset = Dataset::load(&input).unwrap();
    let outcome = pipeline::analyze(
        &dataset,
        "sentence",
        policy(4),
        &mut h.models,
        None,
        &mut pipeline::NoProgress,
    )
    .unwrap();

    let output = dir.path().join("comments.classified.csv");
    outcome.table.write(&output).unwrap();
    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "sentence,likes,author,tone_prediction,class_prediction,tone_name,hate_name",
            "a,7,ann,0,3,Insult,Sexism",
            "c,2,cy,2,0,Positive,No abuse",
        ]
    );
}
