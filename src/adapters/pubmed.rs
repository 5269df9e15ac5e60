//! PubMed search client
//!
//! Bracket-query translation, rate-paced NCBI E-utilities search, and
//! normalization of hits into [`PaperRecord`]s. Each batch is enriched with
//! abstracts and keywords from efetch, and each record with a PMC
//! open-access availability probe.
//! See: https://www.ncbi.nlm.nih.gov/books/NBK25501/

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pmc::PmcClient;
use crate::config::DEFAULT_CONTACT_EMAIL;
use crate::models::{PaperRecord, Publication};
use crate::utils::http::PacingGate;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TOOL_NAME: &str = "offprint";

/// `["multi word phrase"]` or `[term]`; one alternation so the whole input
/// is rewritten in a single pass and replacement text is never rescanned.
static BRACKET_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\["([^"]+)"\]|\[([^\[\]]+)\]"#).unwrap());

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: Option<EsearchResult>,
}

#[derive(Debug, Default, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// Client for PubMed search via NCBI E-utilities.
///
/// Every outbound call (search, summary, PMC enrichment) goes through a
/// single pacing gate: 0.1s minimum interval with an API key, 0.34s without.
pub struct PubMedClient {
    client: Client,
    email: String,
    api_key: Option<String>,
    gate: PacingGate,
    pmc: PmcClient,
}

impl PubMedClient {
    /// Create a new PubMed client.
    ///
    /// # Arguments
    /// * `email` - Contact email NCBI asks clients to send
    /// * `api_key` - Optional NCBI API key for the higher rate limit
    pub fn new(email: Option<String>, api_key: Option<String>) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self::with_client(client, email, api_key))
    }

    /// Create a new client with an existing reqwest client.
    pub fn with_client(client: Client, email: Option<String>, api_key: Option<String>) -> Self {
        let email = email.unwrap_or_else(|| DEFAULT_CONTACT_EMAIL.to_string());
        let api_key = api_key.filter(|k| !k.is_empty());
        let gate = PacingGate::for_api_key(api_key.is_some());
        let pmc = PmcClient::with_client(client.clone());

        Self {
            client,
            email,
            api_key,
            gate,
            pmc,
        }
    }

    /// Translate a bracket-based boolean query into Entrez field syntax.
    ///
    /// `["deep learning"]` becomes `"deep learning"[AllFields]`, `[AI]`
    /// becomes `AI[AllFields]`; `AND`/`OR`/`AND NOT` outside brackets pass
    /// through unchanged. Pure; assumes well-formed bracket syntax.
    pub fn translate_query(query: &str) -> String {
        BRACKET_EXPR
            .replace_all(query, |caps: &regex::Captures| match caps.get(1) {
                Some(phrase) => format!("\"{}\"[AllFields]", phrase.as_str()),
                None => format!("{}[AllFields]", &caps[2]),
            })
            .into_owned()
    }

    /// Build the final Entrez search term: translated query plus optional
    /// date-range and free-full-text predicates.
    pub fn build_search_term(
        query: &str,
        date_range: Option<(i32, i32)>,
        free_full_text_only: bool,
    ) -> String {
        let mut term = Self::translate_query(query);

        if let Some((start_year, end_year)) = date_range {
            term.push_str(&format!(
                " AND ({}:{}[Date - Publication])",
                start_year, end_year
            ));
        }

        if free_full_text_only {
            term.push_str(" AND (\"free full text\"[Filter])");
        }

        term
    }

    /// Search PubMed and return normalized records.
    ///
    /// A failed primary call logs a warning and returns an empty Vec;
    /// callers treat empty-with-diagnostic as recoverable, never a crash.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        date_range: Option<(i32, i32)>,
        free_full_text_only: bool,
    ) -> Vec<PaperRecord> {
        let term = Self::build_search_term(query, date_range, free_full_text_only);
        info!("PubMed search: {}", term);

        let pmids = match self.esearch(&term, max_results).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("PubMed search failed: {}", e);
                return Vec::new();
            }
        };

        if pmids.is_empty() {
            debug!("PubMed search matched nothing");
            return Vec::new();
        }

        let summaries = match self.esummary(&pmids).await {
            Ok(s) => s,
            Err(e) => {
                warn!("PubMed summary fetch failed: {}", e);
                return Vec::new();
            }
        };

        // Abstracts and keywords only exist in the full efetch record; one
        // gated call per batch. Failure leaves those fields empty.
        let details = match self.efetch(&pmids).await {
            Ok(xml) => parse_efetch_details(&xml),
            Err(e) => {
                warn!("PubMed detail fetch failed: {}", e);
                HashMap::new()
            }
        };

        let mut records = Vec::new();
        for pmid in &pmids {
            let Some(summary) = summaries.get(pmid.as_str()) else {
                continue;
            };

            let mut record = map_summary(pmid, summary);

            if let Some(detail) = details.get(pmid.as_str()) {
                record.r#abstract = detail.abstract_text.clone();
                record.keywords = detail.keywords.clone();
            }

            // One gated probe per record: does a PMC mirror copy exist?
            // Any failure leaves the flag false.
            if record.pmid.is_some() {
                self.gate.wait().await;
                record.has_oa_mirror = self.pmc.pmcid_for(pmid).await.is_some();
            }

            records.push(record);
        }

        info!("PubMed search returned {} records", records.len());
        records
    }

    /// Issue one gated esearch call, capped at `max_results`.
    async fn esearch(&self, term: &str, max_results: usize) -> Result<Vec<String>, String> {
        self.gate.wait().await;

        let mut url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=json&tool={}&email={}",
            EUTILS_BASE,
            urlencoding::encode(term),
            max_results,
            TOOL_NAME,
            urlencoding::encode(&self.email)
        );
        if let Some(ref key) = self.api_key {
            url.push_str(&format!("&api_key={}", urlencoding::encode(key)));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("status: {}", resp.status()));
        }

        let data: EsearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("parse failed: {}", e))?;

        Ok(data.esearchresult.unwrap_or_default().idlist)
    }

    /// Issue one gated esummary call for a batch of PMIDs.
    async fn esummary(&self, pmids: &[String]) -> Result<Value, String> {
        self.gate.wait().await;

        let mut url = format!(
            "{}/esummary.fcgi?db=pubmed&id={}&retmode=json&tool={}&email={}",
            EUTILS_BASE,
            pmids.join(","),
            TOOL_NAME,
            urlencoding::encode(&self.email)
        );
        if let Some(ref key) = self.api_key {
            url.push_str(&format!("&api_key={}", urlencoding::encode(key)));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("status: {}", resp.status()));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| format!("parse failed: {}", e))?;

        data.get("result")
            .cloned()
            .ok_or_else(|| "missing result object".to_string())
    }

    /// Issue one gated efetch call for the full article XML of a batch.
    async fn efetch(&self, pmids: &[String]) -> Result<String, String> {
        self.gate.wait().await;

        let mut url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml&tool={}&email={}",
            EUTILS_BASE,
            pmids.join(","),
            TOOL_NAME,
            urlencoding::encode(&self.email)
        );
        if let Some(ref key) = self.api_key {
            url.push_str(&format!("&api_key={}", urlencoding::encode(key)));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("status: {}", resp.status()));
        }

        resp.text()
            .await
            .map_err(|e| format!("read failed: {}", e))
    }
}

/// Efetch-only record fields, keyed by PMID.
#[derive(Debug, Default, Clone)]
struct ArticleDetail {
    abstract_text: String,
    keywords: Vec<String>,
}

/// Pull abstracts and keywords out of an efetch `PubmedArticleSet`.
///
/// Labeled abstract sections are joined with a space. A parse error stops
/// the scan and keeps whatever was extracted before it.
fn parse_efetch_details(xml: &str) -> HashMap<String, ArticleDetail> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut details = HashMap::new();
    let mut buf = Vec::new();

    let mut in_article = false;
    let mut current_element = String::new();
    let mut pmid = String::new();
    let mut detail = ArticleDetail::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                current_element = name.clone();

                if name == "PubmedArticle" {
                    in_article = true;
                    pmid.clear();
                    detail = ArticleDetail::default();
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "PubmedArticle" && in_article {
                    if !pmid.is_empty() {
                        details.insert(pmid.clone(), std::mem::take(&mut detail));
                    }
                    in_article = false;
                }
                current_element.clear();
            }
            Ok(Event::Text(e)) => {
                if in_article {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_element.as_str() {
                        // The citation PMID comes first; later PMID elements
                        // belong to cited references.
                        "PMID" if pmid.is_empty() => pmid = text,
                        "AbstractText" => {
                            if !detail.abstract_text.is_empty() {
                                detail.abstract_text.push(' ');
                            }
                            detail.abstract_text.push_str(&text);
                        }
                        "Keyword" => {
                            let keyword = text.trim().to_string();
                            if !keyword.is_empty() {
                                detail.keywords.push(keyword);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("efetch XML parse error: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    details
}

/// Map one esummary document into a [`PaperRecord`].
///
/// Every field is extracted once, tolerantly: anything missing becomes an
/// empty string or empty sequence, never an error.
fn map_summary(pmid: &str, doc: &Value) -> PaperRecord {
    let mut record = PaperRecord::new(text(doc, "title"));

    record.authors = doc
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    record.publication_date = parse_pub_date(doc);

    let journal = {
        let full = text(doc, "fulljournalname");
        if full.is_empty() {
            text(doc, "source")
        } else {
            full
        }
    };
    let mut publication = Publication::journal(journal);
    publication.issn = {
        let issn = text(doc, "issn");
        if issn.is_empty() {
            text(doc, "essn")
        } else {
            issn
        }
    };
    publication.volume = text(doc, "volume");
    publication.issue = text(doc, "issue");
    record.publication = publication;

    record.databases = vec!["PubMed".to_string()];
    record.pmid = Some(pmid.to_string());
    record.push_url(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));

    if let Some(doi) = extract_doi(doc) {
        record.push_url(format!("https://doi.org/{}", doi));
        record.doi = Some(doi);
    }

    record
}

fn text(doc: &Value, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// ISO date from `sortpubdate` ("2020/03/15 00:00"); falls back to the raw
/// `pubdate` string, or empty.
fn parse_pub_date(doc: &Value) -> String {
    let sort = text(doc, "sortpubdate");
    if let Ok(date) = chrono::NaiveDate::parse_from_str(&sort, "%Y/%m/%d %H:%M") {
        return date.format("%Y-%m-%d").to_string();
    }
    text(doc, "pubdate")
}

/// DOI from the `articleids` list, falling back to `elocationid`.
fn extract_doi(doc: &Value) -> Option<String> {
    if let Some(ids) = doc.get("articleids").and_then(Value::as_array) {
        for id in ids {
            if id.get("idtype").and_then(Value::as_str) == Some("doi") {
                if let Some(value) = id.get("value").and_then(Value::as_str) {
                    if !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    let eloc = text(doc, "elocationid");
    let eloc = eloc.trim_start_matches("doi:").trim();
    if eloc.starts_with("10.") {
        return Some(eloc.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_bare_term() {
        assert_eq!(PubMedClient::translate_query("[AI]"), "AI[AllFields]");
    }

    #[test]
    fn test_translate_quoted_phrase() {
        assert_eq!(
            PubMedClient::translate_query("[\"deep learning\"]"),
            "\"deep learning\"[AllFields]"
        );
    }

    #[test]
    fn test_translate_preserves_connectives() {
        assert_eq!(
            PubMedClient::translate_query("[AI] AND [\"deep learning\"]"),
            "AI[AllFields] AND \"deep learning\"[AllFields]"
        );
        assert_eq!(
            PubMedClient::translate_query("[\"machine learning\"] OR [cancer] AND NOT [mice]"),
            "\"machine learning\"[AllFields] OR cancer[AllFields] AND NOT mice[AllFields]"
        );
    }

    #[test]
    fn test_translate_does_not_rescan_inserted_tags() {
        // Inserted `[AllFields]` must not itself look like a bracket term.
        let out = PubMedClient::translate_query("[\"deep learning\"]");
        assert_eq!(out, "\"deep learning\"[AllFields]");
        assert_eq!(out.matches("[AllFields]").count(), 1);

        let out = PubMedClient::translate_query("[\"a b\"] AND [c]");
        assert_eq!(out, "\"a b\"[AllFields] AND c[AllFields]");
    }

    #[test]
    fn test_translate_is_deterministic() {
        let q = "[biology] AND [cancer]";
        assert_eq!(
            PubMedClient::translate_query(q),
            PubMedClient::translate_query(q)
        );
    }

    #[test]
    fn test_build_search_term_with_predicates() {
        let term = PubMedClient::build_search_term("[cancer]", Some((2018, 2024)), true);
        assert_eq!(
            term,
            "cancer[AllFields] AND (2018:2024[Date - Publication]) AND (\"free full text\"[Filter])"
        );
    }

    #[test]
    fn test_build_search_term_plain() {
        let term = PubMedClient::build_search_term("[cancer]", None, false);
        assert_eq!(term, "cancer[AllFields]");
    }

    fn sample_summary() -> Value {
        serde_json::json!({
            "uid": "31234567",
            "title": "A study of things",
            "sortpubdate": "2020/03/15 00:00",
            "pubdate": "2020 Mar 15",
            "fulljournalname": "Nature",
            "source": "Nature",
            "volume": "579",
            "issue": "7798",
            "issn": "0028-0836",
            "essn": "1476-4687",
            "authors": [
                {"name": "Smith J", "authtype": "Author"},
                {"name": "Doe A", "authtype": "Author"}
            ],
            "articleids": [
                {"idtype": "pubmed", "value": "31234567"},
                {"idtype": "doi", "value": "10.1038/s41586-020-1234-5"}
            ]
        })
    }

    #[test]
    fn test_map_summary_full_record() {
        let record = map_summary("31234567", &sample_summary());
        assert_eq!(record.title, "A study of things");
        assert_eq!(record.authors, vec!["Smith J", "Doe A"]);
        assert_eq!(record.publication_date, "2020-03-15");
        assert_eq!(record.publication.title, "Nature");
        assert_eq!(record.publication.issn, "0028-0836");
        assert_eq!(record.publication.volume, "579");
        assert_eq!(record.publication.category, "Journal");
        assert_eq!(record.pmid.as_deref(), Some("31234567"));
        assert_eq!(record.doi.as_deref(), Some("10.1038/s41586-020-1234-5"));
        assert_eq!(record.databases, vec!["PubMed"]);
        assert_eq!(
            record.urls,
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/31234567/".to_string(),
                "https://doi.org/10.1038/s41586-020-1234-5".to_string(),
            ]
        );
    }

    #[test]
    fn test_map_summary_missing_fields_default() {
        let record = map_summary("99", &serde_json::json!({"uid": "99"}));
        assert_eq!(record.title, "");
        assert!(record.authors.is_empty());
        assert_eq!(record.publication_date, "");
        assert!(record.doi.is_none());
        assert_eq!(record.pmid.as_deref(), Some("99"));
        assert_eq!(record.urls, vec!["https://pubmed.ncbi.nlm.nih.gov/99/"]);
    }

    const EFETCH_FIXTURE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">31234567</PMID>
      <Article>
        <ArticleTitle>A study of things</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Part one.</AbstractText>
          <AbstractText Label="RESULTS">Part two.</AbstractText>
        </Abstract>
      </Article>
      <KeywordList Owner="NOTNLM">
        <Keyword MajorTopicYN="N">deep learning</Keyword>
        <Keyword MajorTopicYN="N">oncology</Keyword>
      </KeywordList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">99</PMID>
      <Article>
        <ArticleTitle>Bare record</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch_details() {
        let details = parse_efetch_details(EFETCH_FIXTURE);
        assert_eq!(details.len(), 2);

        let full = &details["31234567"];
        assert_eq!(full.abstract_text, "Part one. Part two.");
        assert_eq!(full.keywords, vec!["deep learning", "oncology"]);

        // Records without abstract or keywords stay empty, not absent.
        let bare = &details["99"];
        assert_eq!(bare.abstract_text, "");
        assert!(bare.keywords.is_empty());
    }

    #[test]
    fn test_parse_efetch_details_tolerates_bad_xml() {
        let details = parse_efetch_details("<PubmedArticle><PMID>1</wrong>");
        assert!(details.is_empty());
    }

    #[test]
    fn test_extract_doi_from_elocationid() {
        let doc = serde_json::json!({"elocationid": "doi: 10.1001/jama.2019.1"});
        assert_eq!(extract_doi(&doc).as_deref(), Some("10.1001/jama.2019.1"));

        let doc = serde_json::json!({"elocationid": "e12345"});
        assert!(extract_doi(&doc).is_none());
    }

    #[tokio::test]
    async fn test_pubmed_client_creation() {
        let client = PubMedClient::new(Some("test@example.com".to_string()), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_gate_mode_follows_api_key() {
        let client = Client::new();
        let unprivileged = PubMedClient::with_client(client.clone(), None, None);
        assert_eq!(
            unprivileged.gate.min_interval(),
            crate::utils::http::UNPRIVILEGED_INTERVAL
        );

        let privileged =
            PubMedClient::with_client(client, None, Some("key123".to_string()));
        assert_eq!(
            privileged.gate.min_interval(),
            crate::utils::http::PRIVILEGED_INTERVAL
        );
    }
}
