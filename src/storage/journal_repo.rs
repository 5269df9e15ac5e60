//! Journal metrics queries on a live SQLite connection.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::db::StoreError;
use crate::models::JournalMetrics;

/// Repository for journal metrics rows.
pub struct JournalRepo<'a> {
    conn: &'a Connection,
}

impl<'a> JournalRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a metrics row, keyed by ISSN.
    pub fn upsert(&self, metrics: &JournalMetrics) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO journals
                (issn, eissn, title, sjr, sjr_best_quartile,
                 h_index, total_docs, country, areas, categories, year)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                metrics.issn,
                metrics.eissn,
                metrics.title,
                metrics.sjr,
                metrics.best_quartile,
                metrics.h_index,
                metrics.total_docs,
                metrics.country,
                metrics.areas,
                metrics.categories,
                metrics.year,
            ],
        )?;
        Ok(())
    }

    /// Resolve a journal's score: exact ISSN/eISSN match first, then a
    /// case-insensitive title substring match taking the highest score.
    ///
    /// A stored score of 0 means the source value was unparsable and is
    /// treated as absent.
    pub fn resolve_score(&self, name: &str, issn: Option<&str>) -> Result<Option<f64>, StoreError> {
        if let Some(issn) = issn.filter(|i| !i.is_empty()) {
            let score: Option<f64> = self
                .conn
                .query_row(
                    "SELECT sjr FROM journals WHERE issn = ?1 OR eissn = ?1",
                    [issn],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(s) = score {
                if s > 0.0 {
                    return Ok(Some(s));
                }
            }
        }

        // An empty name would substring-match every row.
        if name.is_empty() {
            return Ok(None);
        }

        let pattern = format!("%{}%", name);
        let score: Option<f64> = self
            .conn
            .query_row(
                "SELECT sjr FROM journals WHERE title LIKE ?1 ORDER BY sjr DESC LIMIT 1",
                [pattern],
                |row| row.get(0),
            )
            .optional()?;

        Ok(score.filter(|s| *s > 0.0))
    }

    /// Resolve a journal's best quartile with the same order as
    /// [`JournalRepo::resolve_score`]. Ties to the highest-scored title
    /// match so score and quartile describe the same journal.
    pub fn resolve_quartile(
        &self,
        name: &str,
        issn: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        if let Some(issn) = issn.filter(|i| !i.is_empty()) {
            let quartile: Option<String> = self
                .conn
                .query_row(
                    "SELECT sjr_best_quartile FROM journals WHERE issn = ?1 OR eissn = ?1",
                    [issn],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(q) = quartile.filter(|q| !q.is_empty()) {
                return Ok(Some(q));
            }
        }

        if name.is_empty() {
            return Ok(None);
        }

        let pattern = format!("%{}%", name);
        let quartile: Option<String> = self
            .conn
            .query_row(
                "SELECT sjr_best_quartile FROM journals
                 WHERE title LIKE ?1 ORDER BY sjr DESC LIMIT 1",
                [pattern],
                |row| row.get(0),
            )
            .optional()?;

        Ok(quartile.filter(|q| !q.is_empty()))
    }

    /// Up to `limit` metrics rows ordered by score descending, optionally
    /// restricted to journals whose areas contain `area`.
    pub fn top_journals(
        &self,
        limit: usize,
        area: Option<&str>,
    ) -> Result<Vec<JournalMetrics>, StoreError> {
        let mut journals = Vec::new();

        if let Some(area) = area.filter(|a| !a.is_empty()) {
            let mut stmt = self.conn.prepare(
                "SELECT * FROM journals WHERE areas LIKE ? ORDER BY sjr DESC LIMIT ?",
            )?;
            let pattern = format!("%{}%", area);
            let rows = stmt.query_map(params![pattern, limit as i64], row_to_metrics)?;
            for row in rows {
                journals.push(row?);
            }
        } else {
            let mut stmt = self
                .conn
                .prepare("SELECT * FROM journals ORDER BY sjr DESC LIMIT ?")?;
            let rows = stmt.query_map([limit as i64], row_to_metrics)?;
            for row in rows {
                journals.push(row?);
            }
        }

        Ok(journals)
    }

    /// Number of stored journals, optionally for one data year.
    pub fn count(&self, year: Option<i32>) -> Result<usize, StoreError> {
        let count: i64 = match year {
            Some(y) => self.conn.query_row(
                "SELECT COUNT(*) FROM journals WHERE year = ?",
                [y],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM journals", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }
}

fn row_to_metrics(row: &Row) -> rusqlite::Result<JournalMetrics> {
    Ok(JournalMetrics {
        issn: row.get("issn")?,
        eissn: row.get("eissn")?,
        title: row.get("title")?,
        sjr: row.get("sjr")?,
        best_quartile: row.get("sjr_best_quartile")?,
        h_index: row.get("h_index")?,
        total_docs: row.get("total_docs")?,
        country: row.get("country")?,
        areas: row.get("areas")?,
        categories: row.get("categories")?,
        year: row.get("year")?,
    })
}
