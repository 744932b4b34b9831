// Override rule between the two heads.
//
// A non-insulting tone never carries a hate category, and an insult the hate
// head left uncategorised becomes "Other". Every (tone, hate) pair has an
// output, so reconciliation cannot fail.

use serde::Serialize;

use crate::classifier::RawPrediction;
use crate::dataset::RawRecord;
use crate::labels::{HateCategory, ToneLabel};

/// Apply the override rule to one raw prediction pair.
pub fn reconcile(tone: ToneLabel, hate: HateCategory) -> (ToneLabel, HateCategory) {
    match (tone, hate) {
        (ToneLabel::Neutral | ToneLabel::Positive, _) => (tone, HateCategory::NoAbuse),
        (ToneLabel::Insult, HateCategory::NoAbuse) => (tone, HateCategory::Other),
        (ToneLabel::Insult, _) => (tone, hate),
    }
}

/// Whether a (tone, hate) pair is a possible output of [`reconcile`].
pub fn is_consistent(tone: ToneLabel, hate: HateCategory) -> bool {
    if tone.is_insult() {
        hate != HateCategory::NoAbuse
    } else {
        hate == HateCategory::NoAbuse
    }
}

/// A record with both the raw head outputs and the reconciled labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRecord {
    #[serde(skip)]
    pub record: RawRecord,
    pub raw_tone: ToneLabel,
    pub raw_hate: HateCategory,
    pub tone: ToneLabel,
    pub hate: HateCategory,
}

impl ClassifiedRecord {
    pub fn new(record: RawRecord, raw: RawPrediction) -> Self {
        let (tone, hate) = reconcile(raw.tone, raw.hate);
        Self {
            record,
            raw_tone: raw.tone,
            raw_hate: raw.hate,
            tone,
            hate,
        }
    }

    pub fn text(&self) -> &str {
        &self.record.text
    }

    pub fn tone_name(&self) -> &'static str {
        self.tone.name()
    }

    pub fn hate_name(&self) -> &'static str {
        self.hate.name()
    }

    /// Foreign key into the `tone` lookup table.
    pub fn tone_id(&self) -> i64 {
        self.tone.db_id()
    }

    /// Foreign key into the `hate` lookup table.
    pub fn hate_id(&self) -> i64 {
        self.hate.db_id()
    }

    /// Whether the override rule changed the hate head's answer.
    pub fn overridden(&self) -> bool {
        self.hate != self.raw_hate
    }
}

/// Pair each record with its prediction and reconcile. Both inputs are
/// index-aligned and of equal length.
pub fn reconcile_all(records: Vec<RawRecord>, predictions: Vec<RawPrediction>) -> Vec<ClassifiedRecord> {
    debug_assert_eq!(records.len(), predictions.len());
    records
        .into_iter()
        .zip(predictions)
        .map(|(record, raw)| ClassifiedRecord::new(record, raw))
        .collect()
}
