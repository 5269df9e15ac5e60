//! offprint: scholarly full-text retrieval and journal impact filtering.
//!
//! Three cooperating pieces:
//! - [`adapters::pubmed::PubMedClient`] searches PubMed under NCBI rate
//!   limits and normalizes hits into [`models::PaperRecord`]s.
//! - [`storage::SjrStore`] keeps Scimago Journal Rank metrics in SQLite and
//!   filters records by minimum score.
//! - [`download::DownloadManager`] fetches one PDF per record through an
//!   ordered fallback chain (Unpaywall, PMC, direct links, institutional
//!   proxy).
//!
//! All network operations are sequential from the caller's point of view; a
//! shared pacing gate keeps PubMed traffic within NCBI's limits.

pub mod adapters;
pub mod config;
pub mod download;
pub mod models;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use download::{DownloadManager, DownloadResult, InstitutionCredentials};
pub use models::{PaperRecord, PdfSource, Publication};
pub use storage::SjrStore;
