use serde::{Deserialize, Serialize};

/// Where a successfully downloaded PDF came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PdfSource {
    OaIndex,
    RepositoryMirror,
    DirectLink,
    InstitutionalProxy,
}

impl PdfSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfSource::OaIndex => "oa-index",
            PdfSource::RepositoryMirror => "repository-mirror",
            PdfSource::DirectLink => "direct-link",
            PdfSource::InstitutionalProxy => "institutional-proxy",
        }
    }
}

impl std::fmt::Display for PdfSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Journal/venue metadata attached to a paper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub issn: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub category: String,
}

impl Publication {
    pub fn journal(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: "Journal".to_string(),
            ..Default::default()
        }
    }
}

/// A normalized bibliographic record.
///
/// Created by the search client, then mutated in place as it flows through
/// impact filtering (`sjr_score`, `sjr_quartile`) and PDF acquisition
/// (`pdf_path`, `pdf_downloaded`, `pdf_source`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub r#abstract: String,
    /// ISO date (`YYYY-MM-DD`) or empty when unknown.
    #[serde(default)]
    pub publication_date: String,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub publication: Publication,
    #[serde(default)]
    pub databases: Vec<String>,
    /// Deduplicated, order-preserving. Use [`PaperRecord::push_url`].
    #[serde(default)]
    pub urls: Vec<String>,

    pub pdf_path: Option<String>,
    #[serde(default)]
    pub pdf_downloaded: bool,
    pub pdf_source: Option<PdfSource>,

    pub sjr_score: Option<f64>,
    #[serde(default = "unknown_quartile")]
    pub sjr_quartile: String,
    #[serde(default)]
    pub has_oa_mirror: bool,
}

fn unknown_quartile() -> String {
    "Unknown".to_string()
}

impl PaperRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            r#abstract: String::new(),
            publication_date: String::new(),
            doi: None,
            pmid: None,
            keywords: Vec::new(),
            publication: Publication::default(),
            databases: Vec::new(),
            urls: Vec::new(),
            pdf_path: None,
            pdf_downloaded: false,
            pdf_source: None,
            sjr_score: None,
            sjr_quartile: unknown_quartile(),
            has_oa_mirror: false,
        }
    }

    /// Append a URL unless it is already present.
    pub fn push_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.urls.iter().any(|u| u == &url) {
            self.urls.push(url);
        }
    }

    pub fn authors_str(&self) -> String {
        self.authors.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url_dedupes_preserving_order() {
        let mut record = PaperRecord::new("Test");
        record.push_url("https://doi.org/10.1/a");
        record.push_url("https://pubmed.ncbi.nlm.nih.gov/123/");
        record.push_url("https://doi.org/10.1/a");
        assert_eq!(
            record.urls,
            vec![
                "https://doi.org/10.1/a".to_string(),
                "https://pubmed.ncbi.nlm.nih.gov/123/".to_string(),
            ]
        );
    }

    #[test]
    fn test_pdf_source_serializes_kebab_case() {
        let json = serde_json::to_string(&PdfSource::RepositoryMirror).unwrap();
        assert_eq!(json, "\"repository-mirror\"");
        assert_eq!(PdfSource::OaIndex.as_str(), "oa-index");
    }

    #[test]
    fn test_new_record_defaults() {
        let record = PaperRecord::new("Untitled");
        assert_eq!(record.sjr_quartile, "Unknown");
        assert!(record.sjr_score.is_none());
        assert!(!record.pdf_downloaded);
        assert!(!record.has_oa_mirror);
    }
}
