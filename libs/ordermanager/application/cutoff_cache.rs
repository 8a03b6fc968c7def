//! Latest known cutoff per owner and per owner + token pair

use crate::domain::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CutoffKey {
    pub protocol: Address,
    pub owner: Address,
}

impl CutoffKey {
    pub fn new(protocol: Address, owner: Address) -> Self {
        Self { protocol, owner }
    }
}

/// Pair key with the tokens stored in ascending order, so (A, B) == (B, A)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CutoffPairKey {
    pub protocol: Address,
    pub owner: Address,
    token_low: Address,
    token_high: Address,
}

impl CutoffPairKey {
    pub fn new(protocol: Address, owner: Address, token1: Address, token2: Address) -> Self {
        let (token_low, token_high) = if token1 <= token2 {
            (token1, token2)
        } else {
            (token2, token1)
        };
        Self {
            protocol,
            owner,
            token_low,
            token_high,
        }
    }

    pub fn tokens(&self) -> (Address, Address) {
        (self.token_low, self.token_high)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedCutoff {
    cutoff: u64,
    touched_at: Instant,
}

impl CachedCutoff {
    fn new(cutoff: u64) -> Self {
        Self {
            cutoff,
            touched_at: Instant::now(),
        }
    }
}

/// Result of a compare-and-update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffAdvance {
    /// Incoming cutoff was strictly newer and is now cached
    Advanced { previous: u64 },
    /// Incoming cutoff was not newer; cache unchanged
    Stale { current: u64 },
}

impl CutoffAdvance {
    pub fn advanced(&self) -> bool {
        matches!(self, CutoffAdvance::Advanced { .. })
    }
}

fn advance<K>(map: &DashMap<K, CachedCutoff>, key: K, cutoff: u64) -> CutoffAdvance
where
    K: Eq + std::hash::Hash,
{
    // The entry guard holds the shard lock for the whole compare-and-write
    match map.entry(key) {
        Entry::Occupied(mut entry) => {
            let current = entry.get().cutoff;
            if cutoff > current {
                entry.insert(CachedCutoff::new(cutoff));
                CutoffAdvance::Advanced { previous: current }
            } else {
                CutoffAdvance::Stale { current }
            }
        }
        Entry::Vacant(entry) => {
            if cutoff > 0 {
                entry.insert(CachedCutoff::new(cutoff));
                CutoffAdvance::Advanced { previous: 0 }
            } else {
                CutoffAdvance::Stale { current: 0 }
            }
        }
    }
}

/// Owner-wide and pairwise cutoff timestamps; absent means zero
#[derive(Debug, Default)]
pub struct CutoffCache {
    owners: DashMap<CutoffKey, CachedCutoff>,
    pairs: DashMap<CutoffPairKey, CachedCutoff>,
}

impl CutoffCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_cutoff(&self, key: &CutoffKey) -> u64 {
        self.owners.get(key).map_or(0, |e| e.cutoff)
    }

    /// Unconditional overwrite
    pub fn update_cutoff(&self, key: CutoffKey, cutoff: u64) {
        self.owners.insert(key, CachedCutoff::new(cutoff));
    }

    /// Store `cutoff` only if it is strictly newer than the cached value
    pub fn try_advance(&self, key: CutoffKey, cutoff: u64) -> CutoffAdvance {
        advance(&self.owners, key, cutoff)
    }

    pub fn get_cutoff_pair(&self, key: &CutoffPairKey) -> u64 {
        self.pairs.get(key).map_or(0, |e| e.cutoff)
    }

    pub fn update_cutoff_pair(&self, key: CutoffPairKey, cutoff: u64) {
        self.pairs.insert(key, CachedCutoff::new(cutoff));
    }

    pub fn try_advance_pair(&self, key: CutoffPairKey, cutoff: u64) -> CutoffAdvance {
        advance(&self.pairs, key, cutoff)
    }

    pub fn clear(&self) {
        self.owners.clear();
        self.pairs.clear();
    }

    /// Drop entries not written within `ttl`; returns how many were removed
    pub fn prune(&self, ttl: Duration) -> usize {
        let before = self.len();
        self.owners.retain(|_, v| v.touched_at.elapsed() < ttl);
        self.pairs.retain(|_, v| v.touched_at.elapsed() < ttl);
        before.saturating_sub(self.len())
    }

    pub fn len(&self) -> usize {
        self.owners.len() + self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically prune the cache until the shutdown flag clears
pub fn spawn_cutoff_cache_cleaner(
    cache: Arc<CutoffCache>,
    interval: Duration,
    ttl: Duration,
    shutdown_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Cutoff cache cleaner started (interval {:?}, ttl {:?})",
            interval, ttl
        );
        let check_interval = Duration::from_millis(100).min(interval);
        let mut last_run = Instant::now();

        while shutdown_flag.load(Ordering::Acquire) {
            tokio::time::sleep(check_interval).await;
            if last_run.elapsed() < interval {
                continue;
            }
            last_run = Instant::now();

            let removed = cache.prune(ttl);
            if removed > 0 {
                debug!("Pruned {} cutoff cache entries, {} left", removed, cache.len());
            }
        }

        info!("Cutoff cache cleaner stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_absent_reads_zero() {
        let cache = CutoffCache::new();
        assert_eq!(cache.get_cutoff(&CutoffKey::new(addr(1), addr(2))), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_try_advance_rejects_older_and_equal() {
        let cache = CutoffCache::new();
        let key = CutoffKey::new(addr(1), addr(2));

        assert_eq!(
            cache.try_advance(key, 1000),
            CutoffAdvance::Advanced { previous: 0 }
        );
        assert_eq!(
            cache.try_advance(key, 900),
            CutoffAdvance::Stale { current: 1000 }
        );
        assert_eq!(
            cache.try_advance(key, 1000),
            CutoffAdvance::Stale { current: 1000 }
        );
        assert_eq!(cache.get_cutoff(&key), 1000);

        // update overwrites regardless of order
        cache.update_cutoff(key, 1000);
        cache.update_cutoff(key, 500);
        assert_eq!(cache.get_cutoff(&key), 500);
    }

    #[test]
    fn test_pair_key_is_unordered() {
        let cache = CutoffCache::new();
        let ab = CutoffPairKey::new(addr(1), addr(2), addr(10), addr(20));
        let ba = CutoffPairKey::new(addr(1), addr(2), addr(20), addr(10));
        assert_eq!(ab, ba);

        cache.update_cutoff_pair(ab, 77);
        assert_eq!(cache.get_cutoff_pair(&ba), 77);
        assert!(!cache.try_advance_pair(ba, 77).advanced());

        // owner-wide and pairwise maps are independent
        assert_eq!(cache.get_cutoff(&CutoffKey::new(addr(1), addr(2))), 0);
    }

    #[test]
    fn test_clear_and_prune() {
        let cache = CutoffCache::new();
        cache.update_cutoff(CutoffKey::new(addr(1), addr(2)), 5);
        cache.update_cutoff_pair(CutoffPairKey::new(addr(1), addr(2), addr(3), addr(4)), 5);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.prune(Duration::from_secs(3600)), 0);
        assert_eq!(cache.prune(Duration::ZERO), 2);

        cache.update_cutoff(CutoffKey::new(addr(1), addr(2)), 5);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleaner_stops_with_flag() {
        let cache = Arc::new(CutoffCache::new());
        cache.update_cutoff(CutoffKey::new(addr(1), addr(2)), 5);
        let flag = Arc::new(AtomicBool::new(true));

        let handle = spawn_cutoff_cache_cleaner(
            Arc::clone(&cache),
            Duration::from_millis(10),
            Duration::ZERO,
            Arc::clone(&flag),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.is_empty());

        flag.store(false, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
