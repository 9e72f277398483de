//! Coordinator owning the monitoring state and background loops.
//!
//! One `Monitor` is constructed at process start and injected into the
//! HTTP handlers; every shared map (pool, pending connects, cache,
//! monitored set) lives behind it rather than in ambient globals, and its
//! lifetime is tied to process start/shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cache::MetricsCache;
use super::config::{CACHE_SWEEP_INTERVAL, HEARTBEAT_INTERVAL, IDLE_SWEEP_INTERVAL, Settings};
use super::credentials::CredentialStore;
use super::error::MonitorError;
use super::pool::ConnectionPool;
use super::probes::CommandRunner;
use super::registry::MonitorRegistry;
use super::session::Connector;
use super::types::{MetricsFailure, MetricsSnapshot};

/// Wall-clock cadence of the three background loops.
struct SweepIntervals {
    heartbeat: Duration,
    idle: Duration,
    cache: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            heartbeat: HEARTBEAT_INTERVAL,
            idle: IDLE_SWEEP_INTERVAL,
            cache: CACHE_SWEEP_INTERVAL,
        }
    }
}

/// Process-wide monitoring coordinator.
pub struct Monitor {
    pool: Arc<ConnectionPool>,
    cache: MetricsCache,
    registry: Arc<MonitorRegistry>,
    runner: CommandRunner,
    cache_ttl: Duration,
    intervals: SweepIntervals,
    shutdown: CancellationToken,
}

impl Monitor {
    pub fn new(
        settings: &Settings,
        credentials: CredentialStore,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let registry = Arc::new(MonitorRegistry::new());
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(credentials),
            Arc::clone(&registry),
            connector,
        ));

        Self {
            pool,
            cache: MetricsCache::new(),
            registry,
            runner: CommandRunner::new(settings.command_timeout),
            cache_ttl: settings.cache_ttl,
            intervals: SweepIntervals::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Sample (or serve cached) metrics for one host.
    ///
    /// Cache miss walks the full path: acquire a pooled session, run the
    /// probe battery, cache the snapshot. A dead session is torn down here
    /// so the next request establishes fresh.
    pub async fn metrics(&self, address: &str) -> Result<MetricsSnapshot, MonitorError> {
        self.cache
            .get_or_compute(address, self.cache_ttl, || async {
                let transport = self.pool.acquire(address).await?;
                match self.runner.sample(&transport).await {
                    Ok(snapshot) => Ok(snapshot),
                    Err(error) => {
                        if matches!(error, MonitorError::SessionDead(_)) {
                            self.pool.teardown(address).await;
                        }
                        Err(error)
                    }
                }
            })
            .await
    }

    /// Best-effort body for a failed metrics request: the last cached
    /// snapshot if one exists, zeroed defaults otherwise.
    pub fn failure_body(&self, address: &str, error: &MonitorError) -> MetricsFailure {
        MetricsFailure {
            error: "failed to fetch system metrics".to_string(),
            message: error.to_string(),
            snapshot: self
                .cache
                .last(address)
                .unwrap_or_else(MetricsSnapshot::zeroed),
        }
    }

    /// Start or stop active monitoring of a host. Idempotent both ways.
    ///
    /// Enabling warms the pool eagerly in the background; a warm-up
    /// failure is logged, not surfaced. Disabling cancels reconnect
    /// supervisors, tears the session down and purges the cache entry.
    pub async fn set_monitored(&self, address: &str, enable: bool) {
        if enable {
            if self.registry.enable(address) {
                info!(%address, "ssh monitoring enabled");
                self.pool.warm_up(address);
            }
        } else {
            if self.registry.disable(address) {
                info!(%address, "ssh monitoring disabled");
            }
            self.pool.teardown(address).await;
            self.cache.purge(address);
        }
    }

    /// Spawn the heartbeat, idle-eviction and cache sweeps. They run until
    /// [`shutdown`](Self::shutdown).
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.intervals.heartbeat);
            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = ticker.tick() => monitor.pool.heartbeat_sweep().await,
                }
            }
        });

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.intervals.idle);
            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = ticker.tick() => monitor.pool.evict_idle().await,
                }
            }
        });

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.intervals.cache);
            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = ticker.tick() => monitor.cache.sweep(monitor.cache_ttl),
                }
            }
        });
    }

    /// Stop the background loops and close every pooled session.
    pub async fn shutdown(&self) {
        info!("shutting down, closing pooled ssh sessions");
        self.shutdown.cancel();
        self.pool.close_all().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &MetricsCache {
        &self.cache
    }
}
