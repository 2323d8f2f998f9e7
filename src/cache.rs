//! C4: TTL-based read-through cache with per-key single-flight (spec §4.4).
//!
//! Two instances of the same generic cache back the gateway: one keyed by
//! `lower(user)|coin|fromMs|toMs` for fills, one keyed by `lower(user)` for
//! clearinghouse state. Single-flight is implemented with
//! `tokio::sync::OnceCell` per key — concurrent callers for a missing/
//! expired key all await the same cell, so the fetcher runs at most once
//! (spec §4.4, §9 "per-key single-flight" design note).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

type Outcome<V, E> = Result<Arc<V>, Arc<E>>;

struct Entry<V, E> {
    cell: Arc<OnceCell<Outcome<V, E>>>,
    created_at: Instant,
}

impl<V, E> Clone for Entry<V, E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            created_at: self.created_at,
        }
    }
}

pub struct TtlCache<V, E> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V, E>>>,
}

impl<V, E> TtlCache<V, E> {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drops entries older than `2 * ttl`. Called on every miss (spec §4.4).
    fn prune_at(&self, now: Instant) {
        let stale_after = self.ttl * 2;
        self.entries
            .lock()
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < stale_after);
    }

    fn cell_for_at(&self, key: &str, now: Instant) -> Arc<OnceCell<Outcome<V, E>>> {
        self.prune_at(now);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if now.saturating_duration_since(entry.created_at) < self.ttl {
                return entry.cell.clone();
            }
        }
        let cell = Arc::new(OnceCell::new());
        entries.insert(
            key.to_string(),
            Entry {
                cell: cell.clone(),
                created_at: now,
            },
        );
        cell
    }

    /// Read-through get: returns the fresh cached value, or invokes
    /// `fetcher` (at most once across concurrent callers for this key) and
    /// caches the outcome — success or failure — for the TTL.
    pub async fn get<F, Fut>(&self, key: &str, fetcher: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell_for_at(key, Instant::now());
        cell.get_or_init(|| async move {
            match fetcher().await {
                Ok(v) => Ok(Arc::new(v)),
                Err(e) => Err(Arc::new(e)),
            }
        })
        .await
        .clone()
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.lock().retain(|k, _| !k.starts_with(prefix));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Builds the fills-cache key: `lower(user)|coin|'*'|fromMs|toMs` (spec §4.4).
pub fn fills_cache_key(user: &str, coin: Option<&str>, from_ms: i64, to_ms: i64) -> String {
    let coin = coin.map(|c| c.to_lowercase()).unwrap_or_else(|| "*".into());
    format!("{}|{}|{}|{}", user.to_lowercase(), coin, from_ms, to_ms)
}

pub fn fills_invalidate_prefix(user: &str) -> String {
    format!("{}|", user.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn caches_successful_fetch_within_ttl() {
        let cache: TtlCache<u32, String> = TtlCache::new(60_000);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let result = cache
                .get("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42)
                })
                .await;
            assert_eq!(*result.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_flight_dedupes_concurrent_misses() {
        let cache: Arc<TtlCache<u32, String>> = Arc::new(TtlCache::new(60_000));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get("stampede", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, String>(7)
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| **r == 7));
    }

    #[tokio::test]
    async fn caches_errors_too() {
        let cache: TtlCache<u32, String> = TtlCache::new(60_000);
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let result = cache
                .get("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("boom".to_string())
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_prefix_drops_only_matching_user() {
        let cache: TtlCache<u32, String> = TtlCache::new(60_000);
        let now = Instant::now();
        cache.entries.lock().insert(
            "0xaa|*|0|100".to_string(),
            Entry {
                cell: Arc::new(OnceCell::new()),
                created_at: now,
            },
        );
        cache.entries.lock().insert(
            "0xbb|*|0|100".to_string(),
            Entry {
                cell: Arc::new(OnceCell::new()),
                created_at: now,
            },
        );
        cache.invalidate_prefix(&fills_invalidate_prefix("0xaa"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fills_cache_key_uses_star_for_no_coin_filter() {
        assert_eq!(fills_cache_key("0xAA", None, 1, 2), "0xaa|*|1|2");
        assert_eq!(fills_cache_key("0xAA", Some("BTC"), 1, 2), "0xaa|btc|1|2");
    }
}
