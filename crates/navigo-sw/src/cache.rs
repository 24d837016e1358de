//! Cache API: named containers of request/response pairs.
//!
//! Keys are full request URLs (scheme + host + path + query); the method is
//! implicitly GET. Values carry enough of the response (status, headers,
//! body) to replay it without a network round-trip.

use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use navigo_net::{Fetcher, Request, Response};

use crate::SwError;

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Build an entry from a response, keyed by the request URL.
    pub fn from_response(key: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: key.to_string(),
            method: "GET".to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body().to_vec(),
            cached_at: now_ms(),
        }
    }

    /// Get the body as bytes.
    pub fn body_bytes(&self) -> Bytes {
        Bytes::from(self.body.clone())
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A named cache container.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, keyed by request URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request URL against the cache.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Store an entry.
    pub fn put(&mut self, url: &str, entry: CacheEntry) {
        trace!(cache = %self.name, url, "Cache put");
        self.entries.insert(url.to_string(), entry);
    }

    /// Fetch a URL and store the result.
    ///
    /// Per Cache API `add()` semantics, a response outside 2xx fails the
    /// add rather than caching an error page.
    pub async fn add(&mut self, fetcher: &dyn Fetcher, url: &Url) -> Result<(), SwError> {
        let entry = fetch_entry(fetcher, url).await?;
        self.put(url.as_str(), entry);
        Ok(())
    }

    /// Fetch all URLs and store the results as one atomic batch.
    ///
    /// Every URL is fetched before anything is inserted; a single failure
    /// leaves the cache untouched.
    pub async fn add_all(&mut self, fetcher: &dyn Fetcher, urls: &[Url]) -> Result<(), SwError> {
        let mut fetched = Vec::with_capacity(urls.len());
        for url in urls {
            let entry = fetch_entry(fetcher, url).await?;
            fetched.push((url.as_str().to_string(), entry));
        }

        for (key, entry) in fetched {
            self.entries.insert(key, entry);
        }
        debug!(cache = %self.name, count = urls.len(), "Precache batch stored");
        Ok(())
    }

    /// Delete an entry.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn fetch_entry(fetcher: &dyn Fetcher, url: &Url) -> Result<CacheEntry, SwError> {
    let response = fetcher
        .fetch(Request::get(url.clone()))
        .await
        .map_err(|e| SwError::NetworkError(format!("{}: {}", url, e)))?;

    if !response.ok() {
        return Err(SwError::CacheError(format!(
            "add {} failed with status {}",
            url, response.status
        )));
    }

    Ok(CacheEntry::from_response(url, &response))
}

/// Cache storage: all named cache containers.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if it doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if a cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names.
    pub fn keys(&self) -> Vec<&str> {
        self.caches.keys().map(|s| s.as_str()).collect()
    }

    /// Match a request URL across all caches.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        for cache in self.caches.values() {
            if let Some(entry) = cache.match_request(url) {
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockFetcher;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_cache_add_and_match() {
        let fetcher = MockFetcher::new();
        fetcher.route("https://navigo.example/static/css/style.css", 200, b"css");

        let mut cache = Cache::new("navigo-v1");
        cache
            .add(&fetcher, &url("https://navigo.example/static/css/style.css"))
            .await
            .unwrap();

        let entry = cache
            .match_request("https://navigo.example/static/css/style.css")
            .unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, b"css");
        assert!(cache.match_request("https://navigo.example/other.css").is_none());
    }

    #[tokio::test]
    async fn test_cache_add_rejects_error_status() {
        let fetcher = MockFetcher::new();
        // No route registered: the mock serves 404.

        let mut cache = Cache::new("navigo-v1");
        let result = cache
            .add(&fetcher, &url("https://navigo.example/missing"))
            .await;

        assert!(matches!(result, Err(SwError::CacheError(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_add_all_is_atomic() {
        let fetcher = MockFetcher::new();
        fetcher.route("https://navigo.example/", 200, b"root");
        fetcher.route("https://navigo.example/login", 200, b"login");
        // Third URL is unrouted and will fail the batch.

        let mut cache = Cache::new("navigo-v1");
        let result = cache
            .add_all(
                &fetcher,
                &[
                    url("https://navigo.example/"),
                    url("https://navigo.example/login"),
                    url("https://navigo.example/static/js/main.js"),
                ],
            )
            .await;

        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_delete_and_keys() {
        let mut cache = Cache::new("navigo-v1");
        cache.put(
            "https://navigo.example/",
            CacheEntry {
                url: "https://navigo.example/".to_string(),
                method: "GET".to_string(),
                status: 200,
                headers: HashMap::new(),
                body: b"root".to_vec(),
                cached_at: 0,
            },
        );

        assert_eq!(cache.keys().len(), 1);
        assert!(cache.delete("https://navigo.example/"));
        assert!(!cache.delete("https://navigo.example/"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("navigo-v1"));
        storage.open("navigo-v1");
        assert!(storage.has("navigo-v1"));

        assert!(storage.delete("navigo-v1"));
        assert!(!storage.has("navigo-v1"));
    }

    #[test]
    fn test_cache_storage_match_across_caches() {
        let mut storage = CacheStorage::new();
        storage.open("navigo-v1").put(
            "https://navigo.example/login",
            CacheEntry {
                url: "https://navigo.example/login".to_string(),
                method: "GET".to_string(),
                status: 200,
                headers: HashMap::new(),
                body: b"login".to_vec(),
                cached_at: 0,
            },
        );

        assert!(storage.match_request("https://navigo.example/login").is_some());
        assert!(storage.match_request("https://navigo.example/home").is_none());
    }
}
