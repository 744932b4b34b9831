// Label vocabularies for the two classification heads.
//
// The numeric index of each variant is the class index the head emits, and
// `index + 1` is the primary key of the matching lookup row in the database.
// Seeding walks `ALL` in order, so reordering variants here breaks stored data.

use serde::{Deserialize, Serialize};

/// Emotional tone of a comment (first head, 3 classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToneLabel {
    Insult,
    Neutral,
    Positive,
}

impl ToneLabel {
    /// Every tone in class-index order.
    pub const ALL: [ToneLabel; 3] = [ToneLabel::Insult, ToneLabel::Neutral, ToneLabel::Positive];

    /// Number of classes the tone head must emit.
    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based id of this tone's row in the `tone` lookup table.
    pub fn db_id(self) -> i64 {
        self.index() as i64 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            ToneLabel::Insult => "Insult",
            ToneLabel::Neutral => "Neutral",
            ToneLabel::Positive => "Positive",
        }
    }

    /// Whether this tone can carry a hate category at all.
    pub fn is_insult(self) -> bool {
        self == ToneLabel::Insult
    }
}

impl std::str::FromStr for ToneLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = name_key(s);
        Self::ALL
            .into_iter()
            .find(|t| name_key(t.name()) == key)
            .ok_or_else(|| format!("unknown tone '{s}' (expected insult, neutral or positive)"))
    }
}

impl std::fmt::Display for ToneLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hate/abuse category of a comment (second head, 6 classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HateCategory {
    NoAbuse,
    Xenophobia,
    Homophobia,
    Sexism,
    Lookism,
    Other,
}

impl HateCategory {
    /// Every category in class-index order.
    pub const ALL: [HateCategory; 6] = [
        HateCategory::NoAbuse,
        HateCategory::Xenophobia,
        HateCategory::Homophobia,
        HateCategory::Sexism,
        HateCategory::Lookism,
        HateCategory::Other,
    ];

    /// Number of classes the hate head must emit.
    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based id of this category's row in the `hate` lookup table.
    pub fn db_id(self) -> i64 {
        self.index() as i64 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            HateCategory::NoAbuse => "No abuse",
            HateCategory::Xenophobia => "Xenophobia",
            HateCategory::Homophobia => "Homophobia",
            HateCategory::Sexism => "Sexism",
            HateCategory::Lookism => "Lookism",
            HateCategory::Other => "Other",
        }
    }
}

impl std::str::FromStr for HateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = name_key(s);
        Self::ALL
            .into_iter()
            .find(|h| name_key(h.name()) == key)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|h| h.name()).collect();
                format!("unknown hate category '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

impl std::fmt::Display for HateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Case-folded name with separators removed, so "no-abuse" matches "No abuse".
fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
