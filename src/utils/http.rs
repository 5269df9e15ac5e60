//! HTTP utilities: request pacing and PDF response validation.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// PDF magic bytes: "%PDF-"
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Minimum inter-call interval with an NCBI API key (~10 req/s).
pub const PRIVILEGED_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum inter-call interval without an API key (~3 req/s).
pub const UNPRIVILEGED_INTERVAL: Duration = Duration::from_millis(340);

/// Blocking pacing gate enforcing a minimum interval between outbound calls.
///
/// One instance is shared by every call a client makes (primary search and
/// per-record enrichment alike). If callers ever fan out across workers, the
/// same instance must be shared between them, not duplicated.
pub struct PacingGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Gate for NCBI-style limits: 0.1s interval with an API key, 0.34s
    /// without.
    pub fn for_api_key(has_api_key: bool) -> Self {
        if has_api_key {
            Self::new(PRIVILEGED_INTERVAL)
        } else {
            Self::new(UNPRIVILEGED_INTERVAL)
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the minimum interval since the previous call has elapsed,
    /// then record the new call time.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!("pacing gate: sleeping {:?}", remaining);
                tokio::time::sleep(remaining).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Validate that bytes start a PDF document.
pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    bytes.len() >= PDF_MAGIC.len() && &bytes[..PDF_MAGIC.len()] == PDF_MAGIC
}

/// Whether a Content-Type header declares a PDF body.
pub fn is_pdf_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_lowercase().contains("pdf"))
        .unwrap_or(false)
}

/// Check if a response looks like a login/paywall redirect rather than a
/// document (HTML content type or HTML markers in the first bytes).
pub fn is_likely_login_page(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if let Some(ct) = content_type {
        if ct.contains("text/html") {
            return true;
        }
    }

    if bytes.len() >= 15 {
        let start = String::from_utf8_lossy(&bytes[..15.min(bytes.len())]).to_lowercase();
        if start.contains("<!doctype") || start.contains("<html") {
            return true;
        }
    }

    false
}
