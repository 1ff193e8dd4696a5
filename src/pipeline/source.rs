//! Source resolution: turn an [`ImageSource`] into raw image bytes.
//!
//! Blob sources are returned as-is. URL sources go through the
//! sharing-link rewrite and then a single GET; there are no retries, and no
//! timeout beyond the one configured on the client (if any).

use crate::error::ItemError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, info};

/// Where one image's bytes come from.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Download from this URL.
    Url(String),
    /// Bytes already in memory (an uploaded file).
    Blob(Vec<u8>),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ImageSource::Blob(bytes) => write!(f, "Blob(<{} bytes>)", bytes.len()),
        }
    }
}

/// One entry of a batch. `name` need not be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedItem {
    pub name: String,
    pub source: ImageSource,
}

impl NamedItem {
    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ImageSource::Url(url.into()),
        }
    }

    pub fn blob(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: ImageSource::Blob(bytes.into()),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

static RE_SHARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/d/([^/?#]+)").unwrap());

/// Direct-download endpoint sharing links are rewritten to.
pub const DRIVE_DOWNLOAD_BASE: &str = "https://drive.google.com/uc";

/// Rewrite a Google Drive sharing link (`…/file/d/<id>/view`) to its
/// direct-download form. Any other URL is returned unchanged.
pub fn rewrite_share_link(url: &str) -> String {
    rewrite_share_link_to(url, DRIVE_DOWNLOAD_BASE)
}

fn rewrite_share_link_to(url: &str, base: &str) -> String {
    match RE_SHARE_ID.captures(url) {
        Some(caps) => format!("{}?export=download&id={}", base, &caps[1]),
        None => url.to_string(),
    }
}

/// Resolve a source to raw bytes.
pub async fn resolve(source: &ImageSource, client: &reqwest::Client) -> Result<Vec<u8>, ItemError> {
    resolve_via(source, client, DRIVE_DOWNLOAD_BASE).await
}

async fn resolve_via(
    source: &ImageSource,
    client: &reqwest::Client,
    download_base: &str,
) -> Result<Vec<u8>, ItemError> {
    match source {
        ImageSource::Blob(bytes) => Ok(bytes.clone()),
        ImageSource::Url(url) => download(&rewrite_share_link_to(url, download_base), client).await,
    }
}

/// GET `url`; only a success status yields bytes.
async fn download(url: &str, client: &reqwest::Client) -> Result<Vec<u8>, ItemError> {
    info!("Downloading image from: {}", url);

    let fetch_failure = |reason: String| ItemError::FetchFailure {
        url: url.to_string(),
        reason,
    };

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            fetch_failure("timed out".to_string())
        } else {
            fetch_failure(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_failure(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| fetch_failure(e.to_string()))?;

    debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}
