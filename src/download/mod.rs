//! PDF acquisition orchestrator
//!
//! Fetches one full-text PDF per record by trying strategies in a fixed
//! order: Unpaywall OA index, PMC repository mirror, direct-link scan, then
//! an institutional proxy when credentials are supplied. First success
//! wins; a strategy failure never aborts the chain.

use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::adapters::{PmcClient, UnpaywallClient};
use crate::models::{PaperRecord, PdfSource};
use crate::utils::http::{is_likely_login_page, is_pdf_content_type, is_valid_pdf};

/// Timeout for PDF body transfers.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Error reported when every strategy has been exhausted.
const NO_OA_ERROR: &str = "no open-access copy found";

const USER_AGENT: &str = "offprint/1.0 (scholarly document retrieval)";

/// Maximum characters of title used for fallback filenames.
const MAX_TITLE_CHARS: usize = 50;

/// Credentials for an EZProxy-style institutional gateway.
#[derive(Debug, Clone)]
pub struct InstitutionCredentials {
    /// Proxy URL prefix the target URL is rewritten through.
    pub proxy_prefix: String,
    pub username: String,
    pub password: String,
}

/// Outcome of one full acquisition attempt. Immutable once returned.
#[derive(Debug, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    pub source: Option<PdfSource>,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl DownloadResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            source: None,
            path: None,
            error: Some(error.into()),
        }
    }
}

/// Per-strategy result. `NotApplicable` (precondition unmet) and
/// `TransientFailure` (network/content-type trouble) both advance the
/// chain; `Fatal` (misconfigured credentials) stops it.
enum StrategyOutcome {
    Fetched(PathBuf),
    NotApplicable,
    TransientFailure(String),
    Fatal(String),
}

/// Multi-strategy PDF download manager.
pub struct DownloadManager {
    output_dir: PathBuf,
    client: Client,
    unpaywall: UnpaywallClient,
    pmc: PmcClient,
}

impl DownloadManager {
    /// Create a manager writing PDFs under `output_dir` (created if absent).
    ///
    /// # Arguments
    /// * `output_dir` - Directory PDFs are saved into
    /// * `unpaywall_email` - Contact email for the Unpaywall API
    pub fn new(
        output_dir: impl Into<PathBuf>,
        unpaywall_email: Option<String>,
    ) -> Result<Self, String> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| format!("Failed to create output directory: {}", e))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        let unpaywall = UnpaywallClient::with_client(client.clone(), unpaywall_email);
        let pmc = PmcClient::with_client(client.clone());

        Ok(Self {
            output_dir,
            client,
            unpaywall,
            pmc,
        })
    }

    /// Try every applicable strategy in order and stop at the first success.
    ///
    /// On success the record is updated in place (`pdf_path`,
    /// `pdf_downloaded`, `pdf_source`). When every strategy fails the
    /// result carries `"no open-access copy found"`; nothing is raised.
    pub async fn download(
        &self,
        record: &mut PaperRecord,
        credentials: Option<&InstitutionCredentials>,
    ) -> DownloadResult {
        match self.try_oa_index(record).await {
            StrategyOutcome::Fetched(path) => {
                return self.finish(record, PdfSource::OaIndex, path)
            }
            StrategyOutcome::Fatal(msg) => return DownloadResult::failure(msg),
            StrategyOutcome::NotApplicable => {}
            StrategyOutcome::TransientFailure(e) => debug!("oa-index strategy failed: {}", e),
        }

        match self.try_repository_mirror(record).await {
            StrategyOutcome::Fetched(path) => {
                return self.finish(record, PdfSource::RepositoryMirror, path)
            }
            StrategyOutcome::Fatal(msg) => return DownloadResult::failure(msg),
            StrategyOutcome::NotApplicable => {}
            StrategyOutcome::TransientFailure(e) => {
                debug!("repository-mirror strategy failed: {}", e)
            }
        }

        match self.try_direct_link(record).await {
            StrategyOutcome::Fetched(path) => {
                return self.finish(record, PdfSource::DirectLink, path)
            }
            StrategyOutcome::Fatal(msg) => return DownloadResult::failure(msg),
            StrategyOutcome::NotApplicable => {}
            StrategyOutcome::TransientFailure(e) => debug!("direct-link strategy failed: {}", e),
        }

        if let Some(creds) = credentials {
            match self.try_institutional(record, creds).await {
                StrategyOutcome::Fetched(path) => {
                    return self.finish(record, PdfSource::InstitutionalProxy, path)
                }
                StrategyOutcome::Fatal(msg) => {
                    warn!("institutional proxy misconfigured: {}", msg);
                    return DownloadResult::failure(msg);
                }
                StrategyOutcome::NotApplicable => {}
                StrategyOutcome::TransientFailure(e) => {
                    debug!("institutional-proxy strategy failed: {}", e)
                }
            }
        }

        debug!("All download strategies exhausted for \"{}\"", record.title);
        DownloadResult::failure(NO_OA_ERROR)
    }

    fn finish(&self, record: &mut PaperRecord, source: PdfSource, path: PathBuf) -> DownloadResult {
        record.pdf_path = Some(path.to_string_lossy().into_owned());
        record.pdf_downloaded = true;
        record.pdf_source = Some(source);
        info!("Downloaded PDF via {}: {}", source, path.display());

        DownloadResult {
            success: true,
            source: Some(source),
            path: Some(path),
            error: None,
        }
    }

    /// Strategy 1: Unpaywall OA index, keyed by DOI.
    async fn try_oa_index(&self, record: &PaperRecord) -> StrategyOutcome {
        let Some(doi) = record.doi.as_deref().filter(|d| !d.is_empty()) else {
            return StrategyOutcome::NotApplicable;
        };

        let Some(pdf_url) = self.unpaywall.find_oa_pdf(doi).await else {
            return StrategyOutcome::NotApplicable;
        };

        let filename = filename_for(record, "oa-index", doi);
        match self.fetch_to_file(&pdf_url, &filename, None, false).await {
            Ok(path) => StrategyOutcome::Fetched(path),
            Err(e) => StrategyOutcome::TransientFailure(e),
        }
    }

    /// Strategy 2: PMC mirror, keyed by PMID.
    async fn try_repository_mirror(&self, record: &PaperRecord) -> StrategyOutcome {
        let Some(pmid) = record.pmid.as_deref().filter(|p| !p.is_empty()) else {
            return StrategyOutcome::NotApplicable;
        };

        let Some(pmcid) = self.pmc.pmcid_for(pmid).await else {
            return StrategyOutcome::NotApplicable;
        };

        let pdf_url = PmcClient::pdf_url(&pmcid);
        let filename = filename_for(record, "pmc", &pmcid);
        match self.fetch_to_file(&pdf_url, &filename, None, false).await {
            Ok(path) => StrategyOutcome::Fetched(path),
            Err(e) => StrategyOutcome::TransientFailure(e),
        }
    }

    /// Strategy 3: scan the record's URLs for direct PDF links.
    async fn try_direct_link(&self, record: &PaperRecord) -> StrategyOutcome {
        let candidates = direct_link_candidates(&record.urls);
        if candidates.is_empty() {
            return StrategyOutcome::NotApplicable;
        }

        let filename = filename_for(record, "direct", "");
        let mut last_error = String::new();
        for url in candidates {
            match self.fetch_to_file(url, &filename, None, true).await {
                Ok(path) => return StrategyOutcome::Fetched(path),
                Err(e) => last_error = e,
            }
        }

        StrategyOutcome::TransientFailure(last_error)
    }

    /// Strategy 4: rewrite a canonical URL through the institutional proxy.
    async fn try_institutional(
        &self,
        record: &PaperRecord,
        creds: &InstitutionCredentials,
    ) -> StrategyOutcome {
        // Credentials were explicitly requested; surface gaps before any
        // network activity.
        if creds.proxy_prefix.is_empty() {
            return StrategyOutcome::Fatal(
                "institutional proxy requested but no proxy URL is configured".to_string(),
            );
        }
        if creds.username.is_empty() || creds.password.is_empty() {
            return StrategyOutcome::Fatal(
                "institutional proxy requested but username/password are incomplete".to_string(),
            );
        }

        let Some(url) = proxy_candidate(&record.urls) else {
            return StrategyOutcome::NotApplicable;
        };

        let proxied = format!("{}/{}", creds.proxy_prefix.trim_end_matches('/'), url);
        let filename = filename_for(record, "institution", "");
        match self
            .fetch_to_file(
                &proxied,
                &filename,
                Some((&creds.username, &creds.password)),
                false,
            )
            .await
        {
            Ok(path) => StrategyOutcome::Fetched(path),
            Err(e) => StrategyOutcome::TransientFailure(e),
        }
    }

    /// Fetch a URL and persist it under `filename`, streaming in bounded
    /// chunks. The body goes to `<filename>.part` first and is renamed into
    /// place only after full, verified success; no partial file survives a
    /// failure.
    async fn fetch_to_file(
        &self,
        url: &str,
        filename: &str,
        basic_auth: Option<(&str, &str)>,
        allow_pdf_extension: bool,
    ) -> Result<PathBuf, String> {
        debug!("Fetching {} -> {}", url, filename);

        let mut request = self.client.get(url).header("User-Agent", USER_AGENT);
        if let Some((username, password)) = basic_auth {
            request = request.basic_auth(username, Some(password));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("status: {}", resp.status()));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let declared_pdf = is_pdf_content_type(content_type.as_deref())
            || (allow_pdf_extension && url.to_lowercase().ends_with(".pdf"));
        if !declared_pdf {
            return Err(format!(
                "unexpected content type: {}",
                content_type.as_deref().unwrap_or("(none)")
            ));
        }

        let final_path = self.output_dir.join(filename);
        let temp_path = self.output_dir.join(format!("{}.part", filename));

        let streamed = self
            .stream_body(resp, &temp_path, content_type.as_deref())
            .await;

        match streamed {
            Ok(()) => {
                tokio::fs::rename(&temp_path, &final_path)
                    .await
                    .map_err(|e| format!("failed to finalize file: {}", e))?;
                Ok(final_path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    /// Stream the response body to `temp_path`, validating the first chunk
    /// against the PDF magic bytes and the login-page heuristic.
    async fn stream_body(
        &self,
        mut resp: reqwest::Response,
        temp_path: &Path,
        content_type: Option<&str>,
    ) -> Result<(), String> {
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| format!("failed to create temp file: {}", e))?;

        let mut first_chunk = true;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| format!("read failed: {}", e))?
        {
            if first_chunk {
                first_chunk = false;
                if is_likely_login_page(content_type, &chunk) {
                    return Err("response appears to be a login/paywall page".to_string());
                }
                if !is_valid_pdf(&chunk) {
                    return Err("response is not a valid PDF (bad magic bytes)".to_string());
                }
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write failed: {}", e))?;
        }

        if first_chunk {
            return Err("empty response body".to_string());
        }

        file.flush()
            .await
            .map_err(|e| format!("flush failed: {}", e))?;
        Ok(())
    }
}

/// URLs that heuristically look like direct PDF links.
fn direct_link_candidates(urls: &[String]) -> Vec<&String> {
    urls.iter()
        .filter(|u| u.to_lowercase().contains(".pdf"))
        .collect()
}

/// Candidate URL for the institutional proxy: prefer a DOI resolver or the
/// canonical record page.
fn proxy_candidate(urls: &[String]) -> Option<&String> {
    urls.iter()
        .find(|u| u.contains("doi.org") || u.contains("pubmed"))
}

/// Deterministic, collision-resistant filename for a record.
///
/// Priority: DOI (path separators and dots replaced) > PMID > strategy tag
/// plus opaque id > sanitized, length-bounded title.
fn filename_for(record: &PaperRecord, tag: &str, opaque_id: &str) -> String {
    if let Some(doi) = record.doi.as_deref().filter(|d| !d.is_empty()) {
        let safe_doi = doi.replace('/', "_").replace('.', "_");
        return format!("{}.pdf", safe_doi);
    }

    if let Some(pmid) = record.pmid.as_deref().filter(|p| !p.is_empty()) {
        return format!("PMID_{}.pdf", pmid);
    }

    if !opaque_id.is_empty() {
        return format!("{}_{}.pdf", tag, opaque_id);
    }

    let safe_title: String = record
        .title
        .chars()
        .take(MAX_TITLE_CHARS)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .to_string();

    if safe_title.is_empty() {
        "unknown.pdf".to_string()
    } else {
        format!("{}.pdf", safe_title)
    }
}
