// Best-effort persistence of classified records.
//
// Every row is its own insert. Successes and failures are collected side by
// side; a failed row becomes a PersistenceWarning and the loop moves on.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{queries, schema};
use crate::output::truncate_chars;

use super::reconcile::ClassifiedRecord;

const PREVIEW_CHARS: usize = 60;

/// One record that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceWarning {
    /// Row index in the original dataset.
    pub position: usize,
    pub preview: String,
    pub message: String,
}

impl std::fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} (\"{}\"): {}", self.position, self.preview, self.message)
    }
}

/// Outcome of a persistence pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Row ids of the inserted comments, in record order.
    pub inserted: Vec<i64>,
    pub warnings: Vec<PersistenceWarning>,
}

impl PersistReport {
    pub fn attempted(&self) -> usize {
        self.inserted.len() + self.warnings.len()
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Insert every record into the comment table.
///
/// Lookup tables are checked first. If their ids no longer line up with the
/// label enumerations, nothing is inserted and every record is reported as a
/// warning carrying the reason. Never fails.
pub fn persist(conn: &Connection, records: &[ClassifiedRecord]) -> PersistReport {
    let mut report = PersistReport::default();

    if let Err(e) = schema::verify_lookup_seed(conn) {
        warn!(error = %e, "Lookup tables do not match label enumerations, skipping persistence");
        let message = format!("not persisted: {e}");
        report.warnings = records
            .iter()
            .map(|r| warning(r, message.clone()))
            .collect();
        return report;
    }

    for record in records {
        match queries::insert_comment(
            conn,
            record.text(),
            record.tone,
            record.hate,
            record.record.source.as_deref(),
        ) {
            Ok(id) => report.inserted.push(id),
            Err(e) => {
                warn!(
                    position = record.record.position,
                    error = %e,
                    "Failed to persist comment"
                );
                report.warnings.push(warning(record, e.to_string()));
            }
        }
    }

    info!(
        inserted = report.inserted.len(),
        failed = report.warnings.len(),
        "Persistence complete"
    );
    report
}

fn warning(record: &ClassifiedRecord, message: String) -> PersistenceWarning {
    PersistenceWarning {
        position: record.record.position,
        preview: truncate_chars(record.text(), PREVIEW_CHARS),
        message,
    }
}
