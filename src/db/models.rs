// Data models: Rust structs that map to database rows.
//
// These are separate from the queries so the output layer can render them
// without depending on rusqlite directly.

use serde::{Deserialize, Serialize};

use crate::labels::{HateCategory, ToneLabel};

/// A persisted comment with its lookup names resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredComment {
    pub id: i64,
    pub text: String,
    pub tone: String,
    pub hate: String,
    pub source: Option<String>,
    pub created_at: String,
}

/// Which column a comment search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    #[default]
    Text,
    Tone,
    Hate,
}

impl FilterField {
    /// SQL expression the search term is matched against.
    pub(super) fn column(self) -> &'static str {
        match self {
            FilterField::Text => "c.text",
            FilterField::Tone => "t.name",
            FilterField::Hate => "h.name",
        }
    }
}

impl std::str::FromStr for FilterField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(FilterField::Text),
            "tone" => Ok(FilterField::Tone),
            "hate" => Ok(FilterField::Hate),
            other => Err(format!("unknown field '{other}' (expected text, tone or hate)")),
        }
    }
}

/// Substring search over one comment field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentFilter {
    pub field: FilterField,
    pub term: String,
}

/// Which stored comments to list. Every field that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentQuery {
    pub search: Option<CommentFilter>,
    /// Exact tone
    pub tone: Option<ToneLabel>,
    /// Exact hate category
    pub hate: Option<HateCategory>,
}

impl CommentQuery {
    /// Substring search only.
    pub fn search(filter: CommentFilter) -> Self {
        Self {
            search: Some(filter),
            ..Self::default()
        }
    }
}

/// How many comments carry one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub name: String,
    pub count: i64,
}

/// Per-label comment counts for both lookup tables, in id order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub tones: Vec<LabelCount>,
    pub hates: Vec<LabelCount>,
}

impl LabelDistribution {
    pub fn total(&self) -> i64 {
        self.tones.iter().map(|c| c.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from: String,
    pub table: String,
    pub to: String,
}

/// Shape and size of one table, for the `stats` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: i64,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
}
