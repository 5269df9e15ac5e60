//! External service adapters
//!
//! This module contains adapters for external services and APIs:
//! - PubMed: metadata search via NCBI E-utilities
//! - PMC: PMID-to-PMCID resolution and full-text mirror URLs
//! - Unpaywall: open access PDF lookup by DOI

pub mod pmc;
pub mod pubmed;
pub mod unpaywall;

// Re-export commonly used types
pub use pmc::PmcClient;
pub use pubmed::PubMedClient;
pub use unpaywall::UnpaywallClient;
