//! Environment-backed configuration.
//!
//! Constructed once by the caller and passed into component constructors;
//! nothing in the core components reads the environment on its own.

use std::path::PathBuf;

use crate::download::InstitutionCredentials;

/// Fallback contact address sent to NCBI and Unpaywall when the caller has
/// not configured one.
pub const DEFAULT_CONTACT_EMAIL: &str = "paper-search@example.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Email NCBI asks every E-utilities client to identify with.
    pub ncbi_email: String,
    /// Optional NCBI API key; raises the rate limit from 3 to 10 req/s.
    pub ncbi_api_key: Option<String>,
    /// Email for the Unpaywall API (required by its TOS).
    pub unpaywall_email: String,
    /// Minimum Scimago score for filtering; 0 disables the filter.
    pub min_sjr_score: f64,
    /// Location of the journal metrics database.
    pub sjr_db_path: PathBuf,
    /// Institutional proxy credentials, when all three variables are set.
    pub institution: Option<InstitutionCredentials>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        let ncbi_email =
            std::env::var("NCBI_EMAIL").unwrap_or_else(|_| DEFAULT_CONTACT_EMAIL.to_string());
        let ncbi_api_key = std::env::var("NCBI_API_KEY").ok().filter(|k| !k.is_empty());
        let unpaywall_email =
            std::env::var("UNPAYWALL_EMAIL").unwrap_or_else(|_| DEFAULT_CONTACT_EMAIL.to_string());

        let min_sjr_score = std::env::var("MIN_SJR_SCORE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        let sjr_db_path = std::env::var("SJR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cache").join("sjr_metrics.db"));

        let institution = match (
            std::env::var("INSTITUTIONAL_PROXY").ok().filter(|v| !v.is_empty()),
            std::env::var("INSTITUTION_USERNAME").ok(),
            std::env::var("INSTITUTION_PASSWORD").ok(),
        ) {
            (Some(proxy_prefix), Some(username), Some(password)) => Some(InstitutionCredentials {
                proxy_prefix,
                username,
                password,
            }),
            _ => None,
        };

        Self {
            ncbi_email,
            ncbi_api_key,
            unpaywall_email,
            min_sjr_score,
            sjr_db_path,
            institution,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ncbi_email: DEFAULT_CONTACT_EMAIL.to_string(),
            ncbi_api_key: None,
            unpaywall_email: DEFAULT_CONTACT_EMAIL.to_string(),
            min_sjr_score: 0.0,
            sjr_db_path: PathBuf::from("cache").join("sjr_metrics.db"),
            institution: None,
        }
    }
}
