//! Package retrieval for the update path
//!
//! Retrieval is the only step of an update that talks to the outside
//! world, so the fetch timeout lives here and nowhere else.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Overall timeout for one archive retrieval
const FETCH_TIMEOUT_SECS: u64 = 120;

/// Connect timeout for the HTTP source
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Resolves a package name and version to archive bytes
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Fetch the archive for one package version
    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>>;
}

/// Fetches `{base_url}/{name}/{version}/package.tar.gz` over HTTP
pub struct HttpPackageSource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpPackageSource {
    /// Create a source rooted at a package server base URL.
    ///
    /// The base URL should end with a slash; `Url::join` drops the last
    /// path segment otherwise.
    pub fn new(base_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { base_url, client })
    }

    fn archive_url(&self, name: &str, version: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}/{}/package.tar.gz", name, version))
            .with_context(|| format!("Invalid archive URL for {} {}", name, version))
    }
}

#[async_trait]
impl PackageSource for HttpPackageSource {
    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.archive_url(name, version)?;
        info!("Fetching package archive: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Package fetch failed: HTTP {} for {}",
                response.status(),
                url
            ));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read response body")?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);

        Ok(bytes.to_vec())
    }
}

/// Reads `{root}/{name}_{version}.tar.gz` from a local directory.
///
/// Used by tests and air-gapped hosts that mirror packages to disk.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PackageSource for DirectorySource {
    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{}_{}.tar.gz", name, version));
        debug!("Reading package archive: {:?}", path);

        tokio::fs::read(&path)
            .await
            .with_context(|| format!("No package archive at {:?}", path))
    }
}
