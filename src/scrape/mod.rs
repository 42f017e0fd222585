pub mod cache;
pub mod search;
pub mod specialized;
pub mod website;

use tracing::debug;

use crate::scrape::cache::PageCache;
use crate::sources::http::ScrapeClient;

/// Cache-first page fetch. A transport failure is "no data", logged and
/// swallowed here so scraping loops stay free of error plumbing.
pub async fn cached_fetch(client: &ScrapeClient, cache: &PageCache, url: &str) -> Option<String> {
    if let Some(body) = cache.get(url) {
        debug!(url, "page cache hit");
        return Some(body);
    }
    match client.fetch_text(url).await {
        Ok(body) => {
            cache.put(url, &body);
            Some(body)
        }
        Err(err) => {
            debug!(url, "page fetch failed: {err:#}");
            None
        }
    }
}
