//! Trust-root bundle caching for the TLS bridge connection.
//!
//! The bridge's certificate chain validates against a well-known CA bundle.
//! The bundle is fetched once and persisted under a fixed filename; every
//! later invocation reuses the file. There is no refresh logic; operators
//! replace the file by hand if it goes stale. Concurrent first-time fetches
//! from separate processes are a benign race: the content is identical and
//! the last writer wins.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::error::IotCoreError;

/// Where the bundle comes from and where it is cached.
#[derive(Debug, Clone)]
pub struct TrustRoots {
    /// Directory holding the cached bundle.
    pub cache_dir: PathBuf,

    /// Well-known URL the bundle is fetched from on first use.
    pub url: String,
}

pub const DEFAULT_ROOTS_URL: &str = "https://pki.google.com/roots.pem";

/// Fixed cache filename inside `cache_dir`.
pub const ROOTS_FILENAME: &str = "google_roots.pem";

impl TrustRoots {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        TrustRoots {
            cache_dir: cache_dir.into(),
            url: DEFAULT_ROOTS_URL.to_string(),
        }
    }

    /// Path of the cached bundle file.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(ROOTS_FILENAME)
    }

    /// Returns the path of a usable bundle, fetching and persisting it on
    /// first use.
    pub async fn ensure(&self) -> Result<PathBuf, IotCoreError> {
        let url = self.url.clone();
        ensure_cached(&self.cache_path(), || fetch_remote(url)).await
    }
}

/// Memoized fetch: reuse `path` if it already holds data, otherwise run
/// `fetch` once and persist the result.
///
/// An empty file counts as absent so that an interrupted earlier write does
/// not poison the cache. A failed fetch leaves no file behind.
pub async fn ensure_cached<F, Fut>(path: &Path, fetch: F) -> Result<PathBuf, IotCoreError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>, IotCoreError>>,
{
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => {
            debug!("using cached trust roots at {}", path.display());
            return Ok(path.to_path_buf());
        }
        _ => {}
    }

    let bytes = fetch().await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    info!(
        "cached trust roots at {} ({} bytes)",
        path.display(),
        bytes.len()
    );

    Ok(path.to_path_buf())
}

/// Default fetcher: a single GET against the well-known URL.
pub async fn fetch_remote(url: String) -> Result<Vec<u8>, IotCoreError> {
    let response = reqwest::get(&url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(IotCoreError::TrustRootFetch(format!(
            "{url} answered {status}"
        )));
    }

    Ok(response.bytes().await?.to_vec())
}
