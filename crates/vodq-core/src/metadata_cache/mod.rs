//! Upstream metadata caches (user ids, VOD listings, clip info).
//!
//! Each cache has its own lock and counters, so a lookup in one never waits
//! on another. Entries are evicted lazily on lookup.

mod ttl;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use ttl::{CacheStats, TtlCache};

/// Hit/miss counters for all three caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCacheStats {
    pub user_ids: CacheStats,
    pub vod_listings: CacheStats,
    pub clip_info: CacheStats,
}

#[derive(Debug)]
pub struct MetadataCache {
    /// Streamer login -> platform user id.
    pub user_ids: TtlCache<String>,
    /// User id -> raw VOD listing.
    pub vod_listings: TtlCache<serde_json::Value>,
    /// Clip slug -> raw clip info.
    pub clip_info: TtlCache<serde_json::Value>,
}

impl MetadataCache {
    pub fn new(ttl_minutes: u64) -> Self {
        let ttl = Duration::from_secs(ttl_minutes.saturating_mul(60));
        Self {
            user_ids: TtlCache::new(ttl),
            vod_listings: TtlCache::new(ttl),
            clip_info: TtlCache::new(ttl),
        }
    }

    pub fn stats(&self) -> MetadataCacheStats {
        MetadataCacheStats {
            user_ids: self.user_ids.stats(),
            vod_listings: self.vod_listings.stats(),
            clip_info: self.clip_info.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_are_independent() {
        let cache = MetadataCache::new(10);
        assert_eq!(cache.user_ids.ttl(), Duration::from_secs(600));

        cache.user_ids.put("shroud", "37402112".to_string());
        cache
            .vod_listings
            .put("37402112", serde_json::json!([{ "id": "v1" }]));

        assert_eq!(cache.user_ids.get("shroud").as_deref(), Some("37402112"));
        assert!(cache.clip_info.get("shroud").is_none());
        assert!(cache.vod_listings.get("shroud").is_none());

        let stats = cache.stats();
        assert_eq!(stats.user_ids.hits, 1);
        assert_eq!(stats.user_ids.misses, 0);
        assert_eq!(stats.clip_info.misses, 1);
        assert_eq!(stats.vod_listings.misses, 1);
        assert_eq!(stats.vod_listings.entries, 1);
    }
}
