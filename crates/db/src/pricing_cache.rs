// crates/db/src/pricing_cache.rs
//! Pricing-catalog fetch with a timed on-disk cache.
//!
//! Read path: disk cache fresher than an hour wins; otherwise an HTTPS GET
//! with a hard 30 s timeout, persisted atomically (temp file + rename) so
//! concurrent readers never observe a torn write. Network failure falls
//! back to a stale cache, then to an empty catalog; a fetch failure never
//! fails a sync.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use burntop_core::Catalog;

pub const DEFAULT_PRICING_URL: &str = "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

const CACHE_TTL: Duration = Duration::from_secs(3600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default on-disk cache location under the OS cache directory.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("burntop").join("litellm-pricing.json"))
}

/// Fetch the catalog honoring the disk cache at `cache_path`.
pub async fn fetch_catalog(url: &str, cache_path: Option<&Path>) -> Catalog {
    if let Some(path) = cache_path {
        if cache_is_fresh(path) {
            if let Some(catalog) = read_cache(path) {
                return catalog;
            }
        }
    }

    match http_get(url).await {
        Ok(body) => match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => {
                let catalog = Catalog::from_json(&value);
                if let Some(path) = cache_path {
                    if let Err(e) = atomic_write(path, body.as_bytes()) {
                        warn!("Failed to persist pricing cache: {e}");
                    }
                }
                info!(models = catalog.len(), "Updated pricing catalog");
                catalog
            }
            Err(e) => {
                warn!("Pricing source returned invalid JSON: {e}");
                stale_or_empty(cache_path)
            }
        },
        Err(e) => {
            warn!("Failed to fetch pricing catalog: {e}");
            stale_or_empty(cache_path)
        }
    }
}

fn stale_or_empty(cache_path: Option<&Path>) -> Catalog {
    cache_path
        .and_then(read_cache)
        .unwrap_or_else(Catalog::empty)
}

fn cache_is_fresh(path: &Path) -> bool {
    path.metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age < CACHE_TTL)
        .unwrap_or(false)
}

fn read_cache(path: &Path) -> Option<Catalog> {
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| warn!("Failed to parse pricing cache: {e}"))
        .ok()?;
    Some(Catalog::from_json(&value))
}

/// Write through a sibling temp file and rename into place; readers see
/// either the old or the new content, never a partial file.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

async fn http_get(url: &str) -> reqwest::Result<String> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    response.text().await
}

/// Process-wide catalog handle. The parsed map is read-mostly; refreshes
/// swap an `Arc` behind a lock that is never held across IO.
pub struct PricingHandle {
    url: String,
    cache_path: Option<PathBuf>,
    inner: RwLock<(Arc<Catalog>, Option<Instant>)>,
}

impl PricingHandle {
    pub fn new(url: impl Into<String>, cache_path: Option<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_path,
            inner: RwLock::new((Arc::new(Catalog::empty()), None)),
        }
    }

    /// The current catalog, refreshed through the disk/network path when
    /// the in-memory copy is over an hour old (or was never loaded).
    pub async fn get(&self) -> Arc<Catalog> {
        {
            let guard = self.inner.read().expect("pricing lock");
            if let (catalog, Some(at)) = &*guard {
                if at.elapsed() < CACHE_TTL {
                    return Arc::clone(catalog);
                }
            }
        }

        let fetched = Arc::new(fetch_catalog(&self.url, self.cache_path.as_deref()).await);
        let mut guard = self.inner.write().expect("pricing lock");
        *guard = (Arc::clone(&fetched), Some(Instant::now()));
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "xai/grok-code-fast-1": {
            "input_cost_per_token": 2e-7,
            "output_cost_per_token": 1.5e-6,
            "cache_read_input_token_cost": 2e-8
        }
    }"#;

    #[tokio::test]
    async fn fetch_persists_cache_and_parses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pricing.json")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("pricing.json");
        let url = format!("{}/pricing.json", server.url());

        let catalog = fetch_catalog(&url, Some(&cache)).await;
        mock.assert_async().await;
        assert_eq!(catalog.len(), 1);
        assert!(cache.exists(), "cache file should be written");
        assert!(!cache.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pricing.json")
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("pricing.json");
        std::fs::write(&cache, BODY).unwrap();

        let url = format!("{}/pricing.json", server.url());
        let catalog = fetch_catalog(&url, Some(&cache)).await;
        mock.assert_async().await;
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_stale_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pricing.json")
            .with_status(500)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("pricing.json");
        std::fs::write(&cache, BODY).unwrap();
        // Age the cache beyond the TTL so the fetch is attempted.
        let stale = std::time::SystemTime::now() - Duration::from_secs(7200);
        let file = std::fs::File::options().append(true).open(&cache).unwrap();
        file.set_modified(stale).unwrap();

        let url = format!("{}/pricing.json", server.url());
        let catalog = fetch_catalog(&url, Some(&cache)).await;
        assert_eq!(catalog.len(), 1, "stale cache should still be served");
    }

    #[tokio::test]
    async fn no_cache_and_no_network_yields_empty_catalog() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pricing.json")
            .with_status(500)
            .create_async()
            .await;

        let url = format!("{}/pricing.json", server.url());
        let catalog = fetch_catalog(&url, None).await;
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn handle_serves_and_memoizes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pricing.json")
            .with_status(200)
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/pricing.json", server.url());
        let handle = PricingHandle::new(url, None);
        let first = handle.get().await;
        let second = handle.get().await;
        mock.assert_async().await;
        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
