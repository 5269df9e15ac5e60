//! Journal impact store: SQLite-backed Scimago Journal Rank metrics.
//!
//! The store holds only its database path; every public operation opens and
//! closes its own connection. Concurrent readers are safe; callers must
//! serialize imports.

use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::journal_repo::JournalRepo;
use crate::models::{FilterCounts, ImportReport, JournalMetrics, PaperRecord, SjrSummary};

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("schema setup failed: {0}")]
    Schema(String),
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("csv read failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent store of journal metrics, keyed by ISSN.
pub struct SjrStore {
    db_path: PathBuf,
}

impl SjrStore {
    /// Open or create the store at `db_path`, applying the schema.
    /// Idempotent; safe to call on an existing store.
    pub fn initialize(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let conn = store.open()?;
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!("Journal metrics store ready at {:?}", store.db_path);
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.db_path).map_err(|e| StoreError::Connection(e.to_string()))
    }

    /// Import a semicolon-delimited Scimago export.
    ///
    /// Rows that cannot yield a usable metrics record are skipped and
    /// counted; they never abort the import. Re-importing an ISSN replaces
    /// the stored row (last import wins).
    pub fn import_csv(&self, csv_path: &Path, year: i32) -> Result<ImportReport, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_path(csv_path)?;

        let columns = ColumnMap::from_headers(reader.headers()?);

        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let mut imported = 0usize;
        let mut skipped = 0usize;
        {
            let repo = JournalRepo::new(&tx);
            for row in reader.records() {
                let row = match row {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Skipping unreadable row: {}", e);
                        skipped += 1;
                        continue;
                    }
                };

                match columns.parse_row(&row, year) {
                    Some(metrics) => {
                        repo.upsert(&metrics)?;
                        imported += 1;
                    }
                    None => skipped += 1,
                }
            }
        }
        tx.commit()?;

        info!(
            "Imported SJR data ({}): {} journals, {} rows skipped",
            year, imported, skipped
        );
        Ok(ImportReport { imported, skipped })
    }

    /// Resolve a journal's SJR score by ISSN/eISSN, falling back to a
    /// title substring match (highest score wins). `None` when no match.
    pub fn lookup_score(&self, journal_name: &str, issn: Option<&str>) -> Result<Option<f64>, StoreError> {
        let conn = self.open()?;
        JournalRepo::new(&conn).resolve_score(journal_name, issn)
    }

    /// Resolve a journal's best quartile, `"Unknown"` when absent.
    pub fn lookup_quartile(&self, journal_name: &str, issn: Option<&str>) -> Result<String, StoreError> {
        let conn = self.open()?;
        let quartile = JournalRepo::new(&conn).resolve_quartile(journal_name, issn)?;
        Ok(quartile.unwrap_or_else(|| "Unknown".to_string()))
    }

    /// Attach score and quartile to every record and keep those whose score
    /// is unknown or at least `min_sjr`.
    ///
    /// Unscored records always survive: absence of metrics must never
    /// silently hide a paper.
    pub fn filter_by_min_score(
        &self,
        records: Vec<PaperRecord>,
        min_sjr: f64,
    ) -> Result<(Vec<PaperRecord>, FilterCounts), StoreError> {
        let conn = self.open()?;
        let repo = JournalRepo::new(&conn);

        let mut kept = Vec::new();
        let mut with_score = 0usize;
        let mut without_score = 0usize;

        for mut record in records {
            let name = record.publication.title.clone();
            let issn = Some(record.publication.issn.as_str()).filter(|i| !i.is_empty());

            let score = repo.resolve_score(&name, issn)?;
            let quartile = repo
                .resolve_quartile(&name, issn)?
                .unwrap_or_else(|| "Unknown".to_string());

            record.sjr_score = score;
            record.sjr_quartile = quartile;

            match score {
                Some(s) => {
                    with_score += 1;
                    if s >= min_sjr {
                        kept.push(record);
                    }
                }
                None => {
                    without_score += 1;
                    kept.push(record);
                }
            }
        }

        let counts = FilterCounts {
            with_score,
            without_score,
            total: kept.len(),
        };
        info!(
            "SJR filter (min {}): {} with score, {} without, {} kept",
            min_sjr, with_score, without_score, counts.total
        );
        Ok((kept, counts))
    }

    /// Summary statistics over records carrying an attached score. Median
    /// is the ascending-sorted element at index `n / 2`.
    pub fn summarize(records: &[PaperRecord]) -> SjrSummary {
        let mut scores: Vec<f64> = records.iter().filter_map(|r| r.sjr_score).collect();
        if scores.is_empty() {
            return SjrSummary::empty();
        }

        scores.sort_by(|a, b| a.total_cmp(b));
        let n = scores.len();

        SjrSummary {
            count: n,
            mean: Some(scores.iter().sum::<f64>() / n as f64),
            median: Some(scores[n / 2]),
            max: Some(scores[n - 1]),
            min: Some(scores[0]),
        }
    }

    /// Up to `limit` journals by score descending, optionally restricted to
    /// an area substring.
    pub fn top_journals(
        &self,
        limit: usize,
        area: Option<&str>,
    ) -> Result<Vec<JournalMetrics>, StoreError> {
        let conn = self.open()?;
        JournalRepo::new(&conn).top_journals(limit, area)
    }

    /// Number of stored journals, optionally for one data year.
    pub fn journal_count(&self, year: Option<i32>) -> Result<usize, StoreError> {
        let conn = self.open()?;
        JournalRepo::new(&conn).count(year)
    }
}

/// Header-name driven column mapping for Scimago exports.
///
/// Lookup is by name, not position, so exports with extra or reordered
/// columns import fine. The docs column carries the data year in its
/// header (`Total Docs. (2024)`) and is matched by prefix.
struct ColumnMap {
    indices: HashMap<String, usize>,
    total_docs_idx: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut indices = HashMap::new();
        let mut total_docs_idx = None;

        for (idx, name) in headers.iter().enumerate() {
            let name = name.trim();
            if name.starts_with("Total Docs.") {
                total_docs_idx = Some(idx);
            }
            indices.insert(name.to_string(), idx);
        }

        Self {
            indices,
            total_docs_idx,
        }
    }

    fn field<'r>(&self, row: &'r csv::StringRecord, name: &str) -> &'r str {
        self.indices
            .get(name)
            .and_then(|&idx| row.get(idx))
            .unwrap_or("")
            .trim()
    }

    /// Parse one row; `None` means the row is unusable and gets skipped.
    fn parse_row(&self, row: &csv::StringRecord, year: i32) -> Option<JournalMetrics> {
        let issn = self.field(row, "Issn").to_string();
        let title = self.field(row, "Title").to_string();

        // Without an ISSN there is no primary key to upsert on.
        if issn.is_empty() {
            return None;
        }

        let total_docs = self
            .total_docs_idx
            .and_then(|idx| row.get(idx))
            .map(parse_count)
            .unwrap_or(0);

        Some(JournalMetrics {
            issn,
            eissn: self.field(row, "Eissn").to_string(),
            title,
            sjr: parse_score(self.field(row, "SJR")),
            best_quartile: self.field(row, "SJR Best Quartile").to_string(),
            h_index: parse_count(self.field(row, "H index")),
            total_docs,
            country: self.field(row, "Country").to_string(),
            areas: self.field(row, "Areas").to_string(),
            categories: self.field(row, "Categories").to_string(),
            year,
        })
    }
}

/// Tolerant numeric parse: thousands-separator commas stripped, non-numeric
/// maps to 0.
fn parse_score(value: &str) -> f64 {
    let cleaned = value.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse().unwrap_or(0.0)
}

fn parse_count(value: &str) -> i64 {
    let cleaned = value.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0;
    }
    cleaned.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Publication;
    use std::io::Write;
    use tempfile::tempdir;

    const CSV_HEADER: &str =
        "Issn;Eissn;Title;SJR;SJR Best Quartile;H index;Total Docs. (2024);Country;Areas;Categories";

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", CSV_HEADER).unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        path
    }

    fn store_with(dir: &Path, rows: &[&str]) -> SjrStore {
        let store = SjrStore::initialize(dir.join("sjr.db")).unwrap();
        let csv = write_csv(dir, "sjr.csv", rows);
        store.import_csv(&csv, 2024).unwrap();
        store
    }

    fn record_for(journal: &str, issn: &str) -> PaperRecord {
        let mut record = PaperRecord::new(format!("Paper in {}", journal));
        record.publication = Publication::journal(journal);
        record.publication.issn = issn.to_string();
        record
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sjr.db");
        SjrStore::initialize(&path).unwrap();
        let store = SjrStore::initialize(&path).unwrap();
        assert_eq!(store.journal_count(None).unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_parse_score_strips_thousands_separators() {
        assert_eq!(parse_score("15,234"), 15234.0);
        assert_eq!(parse_score("1.523"), 1.523);
        assert_eq!(parse_score(""), 0.0);
        assert_eq!(parse_score("N/A"), 0.0);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,024"), 1024);
        assert_eq!(parse_count("317"), 317);
        assert_eq!(parse_count("-"), 0);
        assert_eq!(parse_count(""), 0);
    }

    #[test]
    fn test_import_counts_and_values() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[
                "0028-0836;1476-4687;Nature;15,234;Q1;1300;1,024;United Kingdom;Multidisciplinary;Multidisciplinary",
                "1095-9203;;Science;13.2;Q1;1200;900;United States;Multidisciplinary;Multidisciplinary",
            ],
        );

        assert_eq!(store.journal_count(None).unwrap(), 2);
        assert_eq!(store.journal_count(Some(2024)).unwrap(), 2);

        // Scenario: comma-grouped SJR parses with thousands semantics.
        let score = store.lookup_score("Nature", Some("0028-0836")).unwrap();
        assert_eq!(score, Some(15234.0));
    }

    #[test]
    fn test_import_skips_bad_rows_without_aborting() {
        let dir = tempdir().unwrap();
        let store = SjrStore::initialize(dir.path().join("sjr.db")).unwrap();
        let csv = write_csv(
            dir.path(),
            "sjr.csv",
            &[
                ";;Journal With No Issn;1.0;Q2;10;5;Nowhere;Medicine;Medicine",
                "1234-5678;;Good Journal;2.5;Q1;50;100;Somewhere;Medicine;Medicine",
            ],
        );

        let report = store.import_csv(&csv, 2024).unwrap();
        assert_eq!(report, ImportReport { imported: 1, skipped: 1 });
        assert_eq!(store.journal_count(None).unwrap(), 1);
    }

    #[test]
    fn test_reimport_upserts_by_issn() {
        let dir = tempdir().unwrap();
        let store = SjrStore::initialize(dir.path().join("sjr.db")).unwrap();

        let first = write_csv(
            dir.path(),
            "a.csv",
            &["0028-0836;1476-4687;Nature;10.0;Q2;1300;800;UK;Multidisciplinary;Multidisciplinary"],
        );
        let second = write_csv(
            dir.path(),
            "b.csv",
            &["0028-0836;1476-4687;Nature;15.5;Q1;1350;900;UK;Multidisciplinary;Multidisciplinary"],
        );

        store.import_csv(&first, 2023).unwrap();
        store.import_csv(&second, 2024).unwrap();

        // Exactly one row for the ISSN, carrying the latest values.
        assert_eq!(store.journal_count(None).unwrap(), 1);
        let score = store.lookup_score("", Some("0028-0836")).unwrap();
        assert_eq!(score, Some(15.5));
        let quartile = store.lookup_quartile("", Some("0028-0836")).unwrap();
        assert_eq!(quartile, "Q1");
    }

    #[test]
    fn test_lookup_by_eissn_alternate_key() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &["0028-0836;1476-4687;Nature;15.2;Q1;1300;800;UK;Multidisciplinary;Multidisciplinary"],
        );

        let score = store.lookup_score("", Some("1476-4687")).unwrap();
        assert_eq!(score, Some(15.2));
    }

    #[test]
    fn test_title_substring_match_takes_highest_score() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[
                "1111-1111;;Journal of Medicine;3.0;Q2;100;50;US;Medicine;Medicine",
                "2222-2222;;New England Journal of Medicine;20.0;Q1;900;300;US;Medicine;Medicine",
            ],
        );

        // Case-insensitive substring; both match, highest wins.
        let score = store.lookup_score("journal of medicine", None).unwrap();
        assert_eq!(score, Some(20.0));
        let quartile = store.lookup_quartile("journal of medicine", None).unwrap();
        assert_eq!(quartile, "Q1");
    }

    #[test]
    fn test_lookup_unknown_journal() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &["1111-1111;;Some Journal;3.0;Q2;100;50;US;Medicine;Medicine"],
        );

        assert_eq!(store.lookup_score("Nonexistent Venue", None).unwrap(), None);
        assert_eq!(
            store.lookup_quartile("Nonexistent Venue", None).unwrap(),
            "Unknown"
        );
    }

    #[test]
    fn test_zero_score_treated_as_absent() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &["1111-1111;;Scoreless Journal;;Q4;10;5;US;Medicine;Medicine"],
        );

        assert_eq!(
            store.lookup_score("Scoreless Journal", Some("1111-1111")).unwrap(),
            None
        );
    }

    #[test]
    fn test_filter_keeps_unscored_and_applies_inclusive_threshold() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[
                "1111-1111;;High Journal;5.0;Q1;100;50;US;Medicine;Medicine",
                "2222-2222;;Exact Journal;2.0;Q2;80;40;US;Medicine;Medicine",
                "3333-3333;;Low Journal;0.5;Q4;10;5;US;Medicine;Medicine",
            ],
        );

        let records = vec![
            record_for("High Journal", "1111-1111"),
            record_for("Exact Journal", "2222-2222"),
            record_for("Low Journal", "3333-3333"),
            record_for("Unindexed Venue", ""),
        ];

        let (kept, counts) = store.filter_by_min_score(records, 2.0).unwrap();

        let titles: Vec<&str> = kept.iter().map(|r| r.publication.title.as_str()).collect();
        assert_eq!(titles, vec!["High Journal", "Exact Journal", "Unindexed Venue"]);
        assert_eq!(
            counts,
            FilterCounts {
                with_score: 3,
                without_score: 1,
                total: 3
            }
        );

        // Score and quartile were attached in place.
        assert_eq!(kept[0].sjr_score, Some(5.0));
        assert_eq!(kept[0].sjr_quartile, "Q1");
        assert_eq!(kept[1].sjr_score, Some(2.0));
        assert_eq!(kept[2].sjr_score, None);
        assert_eq!(kept[2].sjr_quartile, "Unknown");
    }

    #[test]
    fn test_summarize_empty_and_median_rule() {
        assert_eq!(SjrStore::summarize(&[]), SjrSummary::empty());

        let mut records: Vec<PaperRecord> = Vec::new();
        for score in [4.0, 1.0, 3.0, 2.0] {
            let mut r = PaperRecord::new("p");
            r.sjr_score = Some(score);
            records.push(r);
        }
        let mut unscored = PaperRecord::new("q");
        unscored.sjr_score = None;
        records.push(unscored);

        let summary = SjrStore::summarize(&records);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, Some(2.5));
        // Sorted [1, 2, 3, 4]: median is index n/2.
        assert_eq!(summary.median, Some(3.0));
        assert_eq!(summary.max, Some(4.0));
        assert_eq!(summary.min, Some(1.0));
    }

    #[test]
    fn test_top_journals_order_limit_and_area() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[
                "1111-1111;;Alpha;5.0;Q1;100;50;US;Medicine;Oncology",
                "2222-2222;;Beta;9.0;Q1;200;80;US;Computer Science;AI",
                "3333-3333;;Gamma;7.0;Q1;150;60;US;Medicine;Cardiology",
            ],
        );

        let top = store.top_journals(2, None).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].title, "Beta");
        assert_eq!(top[1].title, "Gamma");

        let medicine = store.top_journals(10, Some("Medicine")).unwrap();
        let titles: Vec<&str> = medicine.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["Gamma", "Alpha"]);
        assert_eq!(medicine[0].h_index, 150);
        assert_eq!(medicine[0].year, 2024);
    }
}
