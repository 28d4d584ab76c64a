//! Result Cache - memoized recommendation results.
//!
//! Entries are keyed by a fingerprint of everything a result depends on, so
//! a changed profile, snapshot or model simply stops matching old entries.
//! Explicit invalidation frees those entries eagerly and guarantees a user's
//! old results are gone before the write that triggered it returns.

use dashmap::DashMap;
use data_loader::UserId;
use pipeline::{HardConstraints, RecommendationQuery, RecommendationResult};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Inputs that fully determine a recommendation result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub user_id: UserId,
    pub profile_version: u64,
    pub constraints: HardConstraints,
    pub count: usize,
    pub snapshot_version: u64,
    pub model_version: Option<u64>,
}

impl Fingerprint {
    pub fn new(
        query: &RecommendationQuery,
        profile_version: u64,
        snapshot_version: u64,
        model_version: Option<u64>,
    ) -> Self {
        Self {
            user_id: query.user_id,
            profile_version,
            constraints: query.constraints.clone(),
            count: query.count,
            snapshot_version,
            model_version,
        }
    }

    /// Stable 64-bit digest, for logging
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

struct CacheEntry {
    result: RecommendationResult,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct ResultCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cached result if present and younger than the TTL
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<RecommendationResult> {
        let hit = self
            .entries
            .get(fingerprint)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.result.clone());

        match hit {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                // Drop an expired entry if there was one
                self.entries
                    .remove_if(fingerprint, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, fingerprint: Fingerprint, result: RecommendationResult) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&fingerprint) {
            self.evict();
        }
        debug!(digest = fingerprint.digest(), "Caching result");
        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove every entry whose fingerprint matches, returning how many went
    pub fn invalidate(&self, predicate: impl Fn(&Fingerprint) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|fingerprint, _| !predicate(fingerprint));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn invalidate_user(&self, user_id: UserId) -> usize {
        self.invalidate(|fingerprint| fingerprint.user_id == user_id)
    }

    pub fn clear(&self) -> usize {
        self.invalidate(|_| true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries, then the oldest one if still full
    fn evict(&self) {
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        if self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(user_id: UserId) -> RecommendationResult {
        RecommendationResult {
            user_id,
            items: Vec::new(),
            fallback: true,
            snapshot_version: 1,
            model_version: None,
        }
    }

    fn fingerprint(user_id: UserId, profile_version: u64) -> Fingerprint {
        Fingerprint::new(&RecommendationQuery::new(user_id, 10), profile_version, 1, None)
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        assert!(cache.get(&fingerprint(1, 0)).is_none());

        cache.put(fingerprint(1, 0), result(1));
        assert_eq!(cache.get(&fingerprint(1, 0)), Some(result(1)));
        assert!(cache.get(&fingerprint(1, 1)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ResultCache::new(Duration::ZERO, 10);
        cache.put(fingerprint(1, 0), result(1));
        assert!(cache.get(&fingerprint(1, 0)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_user() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        cache.put(fingerprint(1, 0), result(1));
        cache.put(fingerprint(1, 1), result(1));
        cache.put(fingerprint(2, 0), result(2));

        assert_eq!(cache.invalidate_user(1), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_capacity_bound() {
        let cache = ResultCache::new(Duration::from_secs(60), 2);
        for user_id in 0..5 {
            cache.put(fingerprint(user_id, 0), result(user_id));
        }
        assert!(cache.len() <= 2);
        assert!(cache.get(&fingerprint(4, 0)).is_some());
    }
}
