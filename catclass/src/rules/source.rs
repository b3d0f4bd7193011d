//! Rule source location and fetch
//!
//! The rule sheet is read exactly once per run, before any product is touched.
//! Any failure here is fatal: no partial rule set is ever used.

use catclass_common::config::RuleSourceSettings;
use catclass_common::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const USER_AGENT: &str = concat!("catclass/", env!("CARGO_PKG_VERSION"));

/// Where the rule sheet lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    File(PathBuf),
    Url(String),
}

impl RuleSource {
    /// `http://` and `https://` locations are URLs, everything else is a path
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            RuleSource::Url(trimmed.to_string())
        } else {
            RuleSource::File(PathBuf::from(trimmed))
        }
    }

    /// Fetch the raw sheet bytes
    ///
    /// Bytes, not text: a row in a foreign encoding is a malformed row, not a
    /// fatal source error.
    pub async fn fetch(&self, settings: &RuleSourceSettings) -> Result<Vec<u8>> {
        let body = match self {
            RuleSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                Error::RuleSource(format!("Read {} failed: {}", path.display(), e))
            })?,
            RuleSource::Url(url) => fetch_url(url, settings.timeout_secs).await?,
        };

        tracing::info!(source = %self, bytes = body.len(), "Fetched rule source");
        Ok(strip_bom(body))
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::File(path) => write!(f, "{}", path.display()),
            RuleSource::Url(url) => write!(f, "{}", url),
        }
    }
}

async fn fetch_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>> {
    let http_client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::RuleSource(format!("HTTP client setup failed: {}", e)))?;

    tracing::debug!(url = %url, timeout_secs, "Requesting rule source");

    let response = http_client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::RuleSource(format!("GET {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::RuleSource(format!(
            "GET {} returned HTTP {}",
            url,
            status.as_u16()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::RuleSource(format!("Reading body of {} failed: {}", url, e)))?;
    Ok(body.to_vec())
}

/// Spreadsheet exports often start with a UTF-8 byte order mark
fn strip_bom(mut body: Vec<u8>) -> Vec<u8> {
    const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
    if body.starts_with(BOM) {
        body.drain(..BOM.len());
    }
    body
}
