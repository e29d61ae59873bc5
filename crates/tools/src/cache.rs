//! Per-provider catalog cache.
//!
//! Entries are keyed by `(provider_id, endpoint)` and expire after the TTL.
//! Nothing invalidates an entry early; a stale read within the window is
//! accepted. Time comes from `tokio::time::Instant`, so a paused test clock
//! drives expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use toolrelay_core::tool::ToolCatalogEntry;

pub const CATALOG_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedListing {
    entries: Vec<ToolCatalogEntry>,
    fetched_at: Instant,
}

#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    listings: Mutex<HashMap<(String, String), CachedListing>>,
}

static GLOBAL: OnceLock<Arc<CatalogCache>> = OnceLock::new();

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            listings: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide cache shared by every catalog build.
    pub fn global() -> Arc<CatalogCache> {
        GLOBAL.get_or_init(|| Arc::new(CatalogCache::default())).clone()
    }

    pub fn get(&self, provider_id: &str, endpoint: &str) -> Option<Vec<ToolCatalogEntry>> {
        let listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings
            .get(&(provider_id.to_string(), endpoint.to_string()))
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.entries.clone())
    }

    pub fn put(&self, provider_id: &str, endpoint: &str, entries: Vec<ToolCatalogEntry>) {
        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        listings.retain(|_, cached| now.duration_since(cached.fetched_at) < self.ttl);
        listings.insert(
            (provider_id.to_string(), endpoint.to_string()),
            CachedListing {
                entries,
                fetched_at: now,
            },
        );
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new(CATALOG_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrelay_core::tool::ToolKind;

    fn entry(name: &str) -> ToolCatalogEntry {
        ToolCatalogEntry {
            remote_name: name.into(),
            input_schema: serde_json::json!({}),
            description: String::new(),
            kind: ToolKind::McpHttp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = CatalogCache::default();
        cache.put("search", "https://a/rpc", vec![entry("find")]);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("search", "https://a/rpc").unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("search", "https://a/rpc").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn key_includes_endpoint() {
        let cache = CatalogCache::default();
        cache.put("search", "https://a/rpc", vec![entry("find")]);
        assert!(cache.get("search", "https://b/rpc").is_none());
        assert!(cache.get("other", "https://a/rpc").is_none());
    }

    #[test]
    fn global_is_shared() {
        let a = CatalogCache::global();
        let b = CatalogCache::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ttl(), CATALOG_CACHE_TTL);
    }
}
