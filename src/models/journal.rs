use serde::{Deserialize, Serialize};

/// One row of the journal metrics store, keyed by print ISSN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalMetrics {
    pub issn: String,
    pub eissn: String,
    pub title: String,
    /// Scimago Journal Rank score. 0.0 means the source value was missing
    /// or unparsable; lookups treat it as absent.
    pub sjr: f64,
    /// "Q1".."Q4" or empty when the export carried none.
    pub best_quartile: String,
    pub h_index: i64,
    pub total_docs: i64,
    pub country: String,
    pub areas: String,
    pub categories: String,
    pub year: i32,
}

/// Outcome of a bulk CSV import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Counts produced alongside a minimum-score filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub with_score: usize,
    pub without_score: usize,
    /// Number of records that survived the filter.
    pub total: usize,
}

/// Summary statistics over the records of a search that carry a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SjrSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

impl SjrSummary {
    pub fn empty() -> Self {
        Self {
            count: 0,
            mean: None,
            median: None,
            max: None,
            min: None,
        }
    }
}
