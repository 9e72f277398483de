//! Per-host SSH session pool.
//!
//! Owns zero-or-one live session per monitored host address. The core
//! invariant: at most one live session and at most one in-flight handshake
//! per address, no matter how many callers ask at once.
//!
//! Deduplication works through the pending-connect map: the first caller
//! atomically installs a shared future for the address and every
//! concurrent caller awaits that same future, observing one settlement.
//! The handshake itself runs on a spawned task, so it completes even if
//! every subscribed caller goes away mid-flight.
//!
//! Lifecycle rules:
//! - heartbeat sweep: a no-op command per monitored session; failure tears
//!   the session down and schedules one supervised reconnect
//! - reconnect: single retry after a fixed backoff, cancelled the instant
//!   the address is unmonitored
//! - idle eviction: unmonitored sessions past the idle threshold are
//!   closed; monitored sessions are never idle-evicted

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{info, warn};

use super::config::{HEARTBEAT_TIMEOUT, IDLE_THRESHOLD, RECONNECT_DELAY};
use super::credentials::CredentialStore;
use super::error::MonitorError;
use super::registry::MonitorRegistry;
use super::session::{Connector, Transport};

/// Heartbeat no-op confirming a session is still usable.
const HEARTBEAT_COMMAND: &str = "echo ping";

type SharedConnect = Shared<BoxFuture<'static, Result<Transport, MonitorError>>>;

/// A pooled live session and its activity bookkeeping.
struct PooledSession {
    transport: Transport,
    connected_at: DateTime<Utc>,
    last_activity: Instant,
}

impl PooledSession {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            connected_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }
}

/// Tuning knobs, overridable in tests; production values come from
/// `config` constants.
#[derive(Debug, Clone)]
pub struct PoolTuning {
    pub heartbeat_timeout: Duration,
    pub reconnect_delay: Duration,
    pub idle_threshold: Duration,
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            reconnect_delay: RECONNECT_DELAY,
            idle_threshold: IDLE_THRESHOLD,
        }
    }
}

/// The per-host connection pool.
pub struct ConnectionPool {
    credentials: Arc<CredentialStore>,
    registry: Arc<MonitorRegistry>,
    connector: Arc<dyn Connector>,
    sessions: DashMap<String, PooledSession>,
    pending: DashMap<String, SharedConnect>,
    tuning: PoolTuning,
}

impl ConnectionPool {
    pub fn new(
        credentials: Arc<CredentialStore>,
        registry: Arc<MonitorRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::with_tuning(credentials, registry, connector, PoolTuning::default())
    }

    pub fn with_tuning(
        credentials: Arc<CredentialStore>,
        registry: Arc<MonitorRegistry>,
        connector: Arc<dyn Connector>,
        tuning: PoolTuning,
    ) -> Self {
        Self {
            credentials,
            registry,
            connector,
            sessions: DashMap::new(),
            pending: DashMap::new(),
            tuning,
        }
    }

    /// Get the live session for an address, or join/establish a handshake.
    ///
    /// Exactly one handshake runs per address at any time; every caller
    /// that arrives before it settles receives the same session or the
    /// same rejection.
    pub async fn acquire(self: &Arc<Self>, address: &str) -> Result<Transport, MonitorError> {
        if let Some(mut session) = self.sessions.get_mut(address) {
            if session.transport.is_closed() {
                drop(session);
                warn!(%address, "pooled session transport is closed, discarding");
                self.teardown(address).await;
            } else {
                session.last_activity = Instant::now();
                return Ok(session.transport.clone());
            }
        }

        // The entry API makes check-and-insert atomic: concurrent callers
        // for one address cannot both install a connect future.
        let connect = match self.pending.entry(address.to_string()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let connect = self.spawn_connect(address.to_string());
                vacant.insert(connect.clone());
                connect
            }
        };

        connect.await
    }

    /// Hand the handshake to a background task and share its outcome.
    fn spawn_connect(self: &Arc<Self>, address: String) -> SharedConnect {
        let pool = Arc::clone(self);
        let task = tokio::spawn(async move {
            match pool.establish(&address).await {
                Ok(transport) => {
                    // Register the session before clearing the pending
                    // entry, so no caller can ever observe neither and
                    // start a duplicate handshake.
                    pool.sessions
                        .insert(address.clone(), PooledSession::new(transport.clone()));

                    // Teardown while the handshake was in flight removes
                    // the pending entry; a transport arriving after that
                    // must not stay pooled.
                    if pool.pending.remove(&address).is_none() {
                        if let Some((_, session)) = pool.sessions.remove(&address) {
                            session.transport.close().await;
                        }
                        warn!(%address, "connect attempt cancelled by teardown");
                        return Err(MonitorError::Connect(format!(
                            "connection to {address} cancelled during handshake"
                        )));
                    }

                    info!(%address, "ssh session pooled");
                    Ok(transport)
                }
                Err(error) => {
                    pool.pending.remove(&address);
                    warn!(%address, %error, "ssh connect failed");
                    Err(error)
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => Err(MonitorError::Connect(format!(
                    "connect task failed: {join_error}"
                ))),
            }
        }
        .boxed()
        .shared()
    }

    async fn establish(&self, address: &str) -> Result<Transport, MonitorError> {
        let credential = self.credentials.lookup(address).await?;
        self.connector.establish(&credential).await
    }

    /// End the session for an address if present and forget any in-flight
    /// handshake. Idempotent.
    pub async fn teardown(&self, address: &str) {
        self.pending.remove(address);
        if let Some((_, session)) = self.sessions.remove(address) {
            session.transport.close().await;
            info!(
                %address,
                connected_at = %session.connected_at.to_rfc3339(),
                "ssh session closed"
            );
        }
    }

    /// Fire-and-forget warm-up for an address; failure is logged, not
    /// surfaced (background path, not a user-facing read).
    pub fn warm_up(self: &Arc<Self>, address: &str) {
        let pool = Arc::clone(self);
        let address = address.to_string();
        tokio::spawn(async move {
            if let Err(error) = pool.acquire(&address).await {
                warn!(%address, %error, "background warm-up failed");
            }
        });
    }

    /// One heartbeat pass over every monitored address.
    ///
    /// A live session gets the no-op command: success refreshes activity,
    /// failure or a non-ready transport tears the session down and
    /// schedules a reconnect. A monitored address with no session at all
    /// (an earlier reconnect failed) is re-acquired in the background.
    pub async fn heartbeat_sweep(self: &Arc<Self>) {
        for address in self.registry.monitored() {
            let transport = self
                .sessions
                .get(&address)
                .map(|session| session.transport.clone());

            match transport {
                Some(transport) if !transport.is_closed() => {
                    match transport
                        .exec(HEARTBEAT_COMMAND, self.tuning.heartbeat_timeout)
                        .await
                    {
                        Ok(output) if output.exit_code == 0 => {
                            if let Some(mut session) = self.sessions.get_mut(&address) {
                                session.last_activity = Instant::now();
                            }
                        }
                        outcome => {
                            warn!(%address, ?outcome, "heartbeat failed, reconnecting");
                            self.teardown(&address).await;
                            self.schedule_reconnect(&address);
                        }
                    }
                }
                Some(_) => {
                    warn!(%address, "session transport not ready, reconnecting");
                    self.teardown(&address).await;
                    self.schedule_reconnect(&address);
                }
                None if !self.pending.contains_key(&address) => {
                    self.warm_up(&address);
                }
                None => {}
            }
        }
    }

    /// Schedule a single supervised reconnect attempt after the backoff.
    ///
    /// The task is a no-op if the address has meanwhile been unmonitored
    /// (its token is cancelled) or a session/pending connect already
    /// exists, avoiding duplicate reconnect races.
    pub fn schedule_reconnect(self: &Arc<Self>, address: &str) {
        let Some(token) = self.registry.token(address) else {
            return;
        };

        let pool = Arc::clone(self);
        let address = address.to_string();
        let delay = self.tuning.reconnect_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if !pool.registry.is_monitored(&address) {
                return;
            }
            if pool.sessions.contains_key(&address) || pool.pending.contains_key(&address) {
                return;
            }

            info!(%address, "attempting ssh reconnect");
            if let Err(error) = pool.acquire(&address).await {
                warn!(%address, %error, "ssh reconnect failed");
            }
        });
    }

    /// Close sessions idle past the threshold whose address is not
    /// monitored. Monitored sessions are only ever removed by heartbeat
    /// failure or explicit teardown.
    pub async fn evict_idle(&self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| {
                !self.registry.is_monitored(entry.key())
                    && now.duration_since(entry.last_activity) > self.tuning.idle_threshold
            })
            .map(|entry| entry.key().clone())
            .collect();

        for address in stale {
            info!(%address, "evicting idle ssh session");
            self.teardown(&address).await;
        }
    }

    /// Close every pooled session, best-effort. Used on shutdown.
    pub async fn close_all(&self) {
        let addresses: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for address in addresses {
            self.teardown(&address).await;
        }
    }

    pub fn has_session(&self, address: &str) -> bool {
        self.sessions.contains_key(address)
    }

    pub fn has_pending(&self, address: &str) -> bool {
        self.pending.contains_key(address)
    }
}
