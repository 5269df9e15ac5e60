//! Unpaywall API client
//!
//! Open access PDF location lookup by DOI.
//! See: https://unpaywall.org/products/api

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DEFAULT_CONTACT_EMAIL;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
    oa_locations: Option<Vec<OaLocation>>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

/// Client for the Unpaywall API.
pub struct UnpaywallClient {
    client: Client,
    email: String,
}

impl UnpaywallClient {
    /// Create a new Unpaywall client.
    ///
    /// # Arguments
    /// * `email` - Contact email (required by the Unpaywall TOS); falls back
    ///   to the crate default when `None`.
    pub fn new(email: Option<String>) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self::with_client(client, email))
    }

    /// Create a new client with an existing reqwest client.
    pub fn with_client(client: Client, email: Option<String>) -> Self {
        let email = email.unwrap_or_else(|| DEFAULT_CONTACT_EMAIL.to_string());
        Self { client, email }
    }

    /// Look up an open access PDF URL by DOI.
    ///
    /// Returns `None` when the article has no OA copy, and also on any
    /// network or parse failure; the caller treats both as "strategy not
    /// applicable here".
    pub async fn find_oa_pdf(&self, doi: &str) -> Option<String> {
        let url = format!(
            "https://api.unpaywall.org/v2/{}?email={}",
            doi,
            urlencoding::encode(&self.email)
        );

        debug!("Unpaywall lookup for DOI: {}", doi);

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Unpaywall request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!("Unpaywall returned status {} for DOI {}", resp.status(), doi);
            return None;
        }

        let data: UnpaywallResponse = match resp.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!("Unpaywall response parse failed: {}", e);
                return None;
            }
        };

        if !data.is_oa {
            debug!("No open access copy for DOI: {}", doi);
            return None;
        }

        // Best location first, then the full list.
        if let Some(best) = data.best_oa_location {
            if let Some(pdf_url) = best.url_for_pdf.filter(|u| !u.is_empty()) {
                debug!("Found OA PDF via best_oa_location: {}", pdf_url);
                return Some(pdf_url);
            }
        }

        if let Some(locations) = data.oa_locations {
            for loc in locations {
                if let Some(pdf_url) = loc.url_for_pdf.filter(|u| !u.is_empty()) {
                    debug!("Found OA PDF via oa_locations: {}", pdf_url);
                    return Some(pdf_url);
                }
            }
        }

        debug!("OA record without a direct PDF URL for DOI: {}", doi);
        None
    }
}
