//! Short-TTL metrics cache.
//!
//! A cache hit costs zero remote round-trips, shielding the remote host
//! from redundant probe batteries while the dashboard polls. The TTL is
//! derived to be strictly shorter than the polling interval, so an entry
//! is always fresher than the next expected poll.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::error::MonitorError;
use super::types::MetricsSnapshot;

struct CacheEntry {
    snapshot: MetricsSnapshot,
    captured_at: Instant,
}

/// Per-host memoization of the last successful probe cycle.
#[derive(Default)]
pub struct MetricsCache {
    entries: DashMap<String, CacheEntry>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a cached snapshot younger than `ttl`, or run `compute` and
    /// cache its result.
    ///
    /// A failed compute never overwrites an existing entry; the stale
    /// snapshot stays available through [`last`](Self::last) for
    /// best-effort error bodies.
    pub async fn get_or_compute<F, Fut>(
        &self,
        address: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<MetricsSnapshot, MonitorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MetricsSnapshot, MonitorError>>,
    {
        if let Some(snapshot) = self.fresh(address, ttl) {
            debug!(%address, "metrics served from cache");
            return Ok(snapshot);
        }

        let snapshot = compute().await?;
        self.entries.insert(
            address.to_string(),
            CacheEntry {
                snapshot: snapshot.clone(),
                captured_at: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// The cached snapshot if it is younger than `ttl`.
    pub fn fresh(&self, address: &str, ttl: Duration) -> Option<MetricsSnapshot> {
        self.entries.get(address).and_then(|entry| {
            (entry.captured_at.elapsed() < ttl).then(|| entry.snapshot.clone())
        })
    }

    /// The last cached snapshot regardless of age, for error bodies.
    pub fn last(&self, address: &str) -> Option<MetricsSnapshot> {
        self.entries.get(address).map(|entry| entry.snapshot.clone())
    }

    /// Drop one host's entry immediately (monitor-stop path).
    pub fn purge(&self, address: &str) {
        self.entries.remove(address);
    }

    /// Drop every entry older than `ttl`. Runs on a periodic sweep so
    /// hosts that silently stop being polled don't pin memory.
    pub fn sweep(&self, ttl: Duration) {
        self.entries.retain(|address, entry| {
            let keep = entry.captured_at.elapsed() < ttl;
            if !keep {
                debug!(%address, "purged expired metrics cache entry");
            }
            keep
        });
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(cpu: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            cpu,
            ..MetricsSnapshot::zeroed()
        }
    }

    #[tokio::test]
    async fn test_second_read_within_ttl_skips_compute() {
        let cache = MetricsCache::new();
        let computes = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for _ in 0..2 {
            let result = cache
                .get_or_compute("10.0.0.1", ttl, || async {
                    computes.fetch_add(1, Ordering::SeqCst);
                    Ok(snapshot(5.0))
                })
                .await
                .unwrap();
            assert_eq!(result.cpu, 5.0);
        }

        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_recompute() {
        let cache = MetricsCache::new();
        let computes = AtomicUsize::new(0);
        let ttl = Duration::from_millis(10);

        let compute = || async {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(snapshot(5.0))
        };
        cache.get_or_compute("10.0.0.1", ttl, compute).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let compute = || async {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(snapshot(7.0))
        };
        let result = cache.get_or_compute("10.0.0.1", ttl, compute).await.unwrap();

        assert_eq!(computes.load(Ordering::SeqCst), 2);
        assert_eq!(result.cpu, 7.0);
    }

    #[tokio::test]
    async fn test_failed_compute_keeps_existing_entry() {
        let cache = MetricsCache::new();
        let ttl = Duration::from_millis(10);

        cache
            .get_or_compute("10.0.0.1", ttl, || async { Ok(snapshot(5.0)) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let error = cache
            .get_or_compute("10.0.0.1", ttl, || async {
                Err(MonitorError::Connect("refused".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(error, MonitorError::Connect(_)));
        // The stale snapshot survives for best-effort error bodies
        assert_eq!(cache.last("10.0.0.1").unwrap().cpu, 5.0);
    }

    #[tokio::test]
    async fn test_purge_removes_entry_immediately() {
        let cache = MetricsCache::new();
        cache
            .get_or_compute("10.0.0.1", Duration::from_secs(60), || async {
                Ok(snapshot(5.0))
            })
            .await
            .unwrap();

        cache.purge("10.0.0.1");
        assert!(!cache.contains("10.0.0.1"));
        assert!(cache.last("10.0.0.1").is_none());
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired_entries() {
        let cache = MetricsCache::new();
        let ttl = Duration::from_millis(30);

        cache
            .get_or_compute("old", ttl, || async { Ok(snapshot(1.0)) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache
            .get_or_compute("new", ttl, || async { Ok(snapshot(2.0)) })
            .await
            .unwrap();

        cache.sweep(ttl);

        assert!(!cache.contains("old"));
        assert!(cache.contains("new"));
    }
}
