// Tabular datasets: load raw comment tables, clean them, and write the
// annotated result back out.
//
// A table is an ordered list of JSON objects. Files ending in `.csv` are read
// with a header row and every cell as a string; `.jsonl` or `.ndjson` hold one
// object per line; anything else is read as a JSON array. Columns the
// pipeline doesn't know about are carried through untouched, and output is
// written in `columns()` order.

use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use serde_json::{Map, Value};
use tracing::debug;

use crate::pipeline::{PipelineError, Result};

/// One row of a dataset.
pub type Row = Map<String, Value>;

/// Metadata columns lifted onto [`RawRecord`] when present.
const AUTHOR_COLUMNS: [&str; 2] = ["author", "username"];
const TIMESTAMP_COLUMNS: [&str; 3] = ["timestamp", "date", "published_at"];
const SOURCE_COLUMNS: [&str; 2] = ["source", "origin"];

/// On-disk table layout, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// A single JSON array of objects.
    Json,
    /// One JSON object per line.
    JsonLines,
    /// Comma-separated values with a header row.
    Csv,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                TableFormat::JsonLines
            }
            Some(ext) if ext.eq_ignore_ascii_case("csv") => TableFormat::Csv,
            _ => TableFormat::Json,
        }
    }
}

/// An ordered table of rows plus the columns seen across them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset from rows. Columns are recorded in first-seen order.
    pub fn new(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Build a dataset whose column order is already known. Keys missing from
    /// `columns` are added in first-seen order.
    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut dataset = Self::new(rows);
        let extra: Vec<String> = dataset
            .columns
            .drain(..)
            .filter(|c| !columns.contains(c))
            .collect();
        dataset.columns = columns;
        dataset.columns.extend(extra);
        dataset
    }

    /// Single-column dataset, mostly useful for callers that already hold
    /// plain strings.
    pub fn from_texts<S: AsRef<str>>(column: &str, texts: &[S]) -> Self {
        let rows = texts
            .iter()
            .map(|t| {
                let mut row = Row::new();
                row.insert(column.to_string(), Value::String(t.as_ref().to_string()));
                row
            })
            .collect();
        Self::new(rows)
    }

    /// Load a dataset from disk. Malformed files are input validation errors.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::input(format!("cannot read {}: {}", path.display(), e))
        })?;

        let dataset = match TableFormat::from_path(path) {
            TableFormat::Json => Self::from_json_str(&contents)?,
            TableFormat::JsonLines => Self::from_json_lines(&contents)?,
            TableFormat::Csv => Self::from_csv_str(&contents)?,
        };

        debug!(
            rows = dataset.len(),
            columns = dataset.columns.len(),
            path = %path.display(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Parse a JSON array of objects.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| PipelineError::input(format!("malformed JSON table: {e}")))?;

        let Value::Array(items) = value else {
            return Err(PipelineError::input("expected a JSON array of objects"));
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| into_row(item, i + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(rows))
    }

    /// Parse JSON Lines. Blank lines are skipped.
    pub fn from_json_lines(contents: &str) -> Result<Self> {
        let rows = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                let value: Value = serde_json::from_str(line).map_err(|e| {
                    PipelineError::input(format!("malformed JSON on line {}: {}", i + 1, e))
                })?;
                into_row(value, i + 1)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(rows))
    }

    /// Parse CSV with a header row. Empty cells become null so cleaning
    /// treats them like missing values.
    pub fn from_csv_str(contents: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(contents.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| PipelineError::input(format!("malformed CSV header: {e}")))?
            .iter()
            .map(String::from)
            .collect();

        for (i, name) in headers.iter().enumerate() {
            if headers[..i].contains(name) {
                return Err(PipelineError::input(format!("duplicate CSV column '{name}'")));
            }
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                // Header is line 1
                PipelineError::input(format!("malformed CSV on line {}: {}", i + 2, e))
            })?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(name, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (name.clone(), value)
                })
                .collect();
            rows.push(row);
        }

        Ok(Self::with_columns(headers, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Rows with their keys rearranged into `columns()` order.
    fn ordered_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect()
    }

    /// Serialize as a pretty-printed JSON array.
    pub fn to_json_string(&self) -> AnyResult<String> {
        Ok(serde_json::to_string_pretty(&self.ordered_rows())?)
    }

    /// Serialize as JSON Lines (trailing newline included).
    pub fn to_json_lines(&self) -> AnyResult<String> {
        let mut out = String::new();
        for row in self.ordered_rows() {
            out.push_str(&serde_json::to_string(&row)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Serialize as CSV with a header row. Missing and null cells are empty;
    /// arrays and objects are written as JSON text.
    pub fn to_csv_string(&self) -> AnyResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|c| csv_cell(row.get(c))))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Write the table to `path`, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> AnyResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let body = match TableFormat::from_path(path) {
            TableFormat::Json => self.to_json_string()?,
            TableFormat::JsonLines => self.to_json_lines()?,
            TableFormat::Csv => self.to_csv_string()?,
        };

        std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn into_row(value: Value, line: usize) -> Result<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::input(format!(
            "row {line} is not an object (found {})",
            json_kind(&other)
        ))),
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single comment that survived cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Index of the source row in the original dataset.
    pub position: usize,
    pub text: String,
    pub author: Option<String>,
    pub timestamp: Option<String>,
    pub source: Option<String>,
}

impl RawRecord {
    fn from_row(position: usize, text: &str, row: &Row) -> Self {
        Self {
            position,
            text: text.to_string(),
            author: first_string(row, &AUTHOR_COLUMNS),
            timestamp: first_string(row, &TIMESTAMP_COLUMNS),
            source: first_string(row, &SOURCE_COLUMNS),
        }
    }
}

fn first_string(row: &Row, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match row.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Validate and clean a dataset, in this order:
/// 1. the dataset must have rows,
/// 2. `column` must exist,
/// 3. rows whose text is missing, non-string, or whitespace-only are dropped,
/// 4. at least one row must remain.
///
/// Surviving records keep their original relative order.
pub fn clean(dataset: &Dataset, column: &str) -> Result<Vec<RawRecord>> {
    if dataset.is_empty() {
        return Err(PipelineError::input("dataset is empty"));
    }

    if !dataset.has_column(column) {
        return Err(PipelineError::input(format!(
            "required text column '{column}' not found (columns: {})",
            dataset.columns().join(", ")
        )));
    }

    let records: Vec<RawRecord> = dataset
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(i, row)| match row.get(column) {
            Some(Value::String(text)) if !text.trim().is_empty() => {
                Some(RawRecord::from_row(i, text, row))
            }
            _ => None,
        })
        .collect();

    let dropped = dataset.len() - records.len();
    if dropped > 0 {
        debug!(dropped, kept = records.len(), "Dropped blank rows");
    }

    if records.is_empty() {
        return Err(PipelineError::input(format!(
            "no non-blank values in column '{column}' after cleaning"
        )));
    }

    Ok(records)
}
