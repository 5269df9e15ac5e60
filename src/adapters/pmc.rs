//! PubMed Central (PMC) ID converter client.
//!
//! Resolves PMIDs to PMCIDs via the NCBI ID converter service; a resolved
//! PMCID means an open-access full-text mirror copy exists.
//! See: https://www.ncbi.nlm.nih.gov/pmc/tools/id-converter-api/

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const ID_CONVERTER_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/id/convert/v3.0/";

/// ID-converter calls are cheap; keep the timeout tight.
const CONVERT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    records: Vec<ConvertRecord>,
}

#[derive(Debug, Deserialize)]
struct ConvertRecord {
    pmcid: Option<String>,
}

/// Client for the PMC ID converter.
pub struct PmcClient {
    client: Client,
}

impl PmcClient {
    pub fn new() -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CONVERT_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }

    /// Create a new client with an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Resolve a PMID to its PMCID, if the article has a PMC mirror.
    ///
    /// Failures are swallowed: most articles simply have no PMC version,
    /// and a network error here must never escalate.
    pub async fn pmcid_for(&self, pmid: &str) -> Option<String> {
        let url = format!(
            "{}?ids={}&format=json",
            ID_CONVERTER_URL,
            urlencoding::encode(pmid)
        );

        debug!("PMC ID lookup for PMID: {}", pmid);

        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            debug!("PMC ID converter returned status {}", resp.status());
            return None;
        }

        let data: ConvertResponse = resp.json().await.ok()?;
        let pmcid = data.records.into_iter().next().and_then(|r| r.pmcid);

        match &pmcid {
            Some(id) => debug!("PMID {} resolves to {}", pmid, id),
            None => debug!("PMID {} has no PMC mirror", pmid),
        }

        pmcid
    }

    /// Canonical PDF URL for a PMC article.
    pub fn pdf_url(pmcid: &str) -> String {
        format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/", pmcid)
    }
}
