//! Configuration resolution for the monitor server.
//!
//! Environment variables are resolved with env var -> default priority:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | 5001 | HTTP bind port |
//! | `POLLING_INTERVAL` | 60000 | Dashboard polling interval in milliseconds |
//! | `SSH_CONNECT_TIMEOUT` | 20 | Handshake timeout in seconds |
//! | `SSH_COMMAND_TIMEOUT` | 15 | Per-probe execution timeout in seconds |
//! | `SSH_MAX_RETRIES` | 2 | Transient handshake retries within one attempt |
//! | `SSH_RETRY_DELAY_MS` | 1000 | Initial retry delay in milliseconds |
//!
//! The metrics cache TTL is derived from the polling interval: slightly
//! shorter than it, so a cached entry is always fresher than the next
//! expected poll, and floored so tiny polling intervals don't produce a
//! zero TTL.

use std::env;
use std::time::Duration;

/// Default HTTP bind port
pub(crate) const DEFAULT_PORT: u16 = 5001;

/// Default dashboard polling interval in milliseconds
pub(crate) const DEFAULT_POLLING_INTERVAL_MS: u64 = 60_000;

/// Margin subtracted from the polling interval to derive the cache TTL
pub(crate) const CACHE_TTL_MARGIN: Duration = Duration::from_millis(5_000);

/// Lower bound for the derived cache TTL
pub(crate) const MIN_CACHE_TTL: Duration = Duration::from_millis(1_000);

/// Default SSH handshake timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

/// Default per-probe command timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 15;

/// Default maximum retry attempts for transient handshake failures
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Interval between heartbeat sweeps over monitored sessions
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for the heartbeat no-op command
pub(crate) const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff before the single supervised reconnect attempt
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Idle threshold past which an unmonitored session is evicted
pub(crate) const IDLE_THRESHOLD: Duration = Duration::from_secs(300);

/// Interval between idle-eviction sweeps
pub(crate) const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between cache purge sweeps
pub(crate) const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default keepalive interval for pooled sessions
pub(crate) const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Staleness TTL for the credential table
pub const CREDENTIALS_TTL: Duration = Duration::from_secs(300);

/// Fixed relative path of the credential table
pub const CREDENTIALS_PATH: &str = "ssh-config.json";

/// Environment variable name for the HTTP bind port
pub(crate) const PORT_ENV_VAR: &str = "PORT";

/// Environment variable name for the polling interval in milliseconds
pub(crate) const POLLING_INTERVAL_ENV_VAR: &str = "POLLING_INTERVAL";

/// Environment variable name for the SSH handshake timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";

/// Environment variable name for the per-probe command timeout
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";

/// Environment variable name for SSH max retries
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";

/// Environment variable name for the SSH retry delay in milliseconds
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";

/// Resolved runtime settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub polling_interval: Duration,
    pub cache_ttl: Duration,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let polling_interval = Duration::from_millis(resolve_polling_interval_ms());
        Self {
            port: resolve_port(),
            polling_interval,
            cache_ttl: derive_cache_ttl(polling_interval),
            connect_timeout: Duration::from_secs(resolve_connect_timeout()),
            command_timeout: Duration::from_secs(resolve_command_timeout()),
            max_retries: resolve_max_retries(),
            retry_delay: Duration::from_millis(resolve_retry_delay_ms()),
        }
    }
}

/// Cache TTL is strictly shorter than the polling interval so an entry is
/// always fresher than the next expected poll, floored at [`MIN_CACHE_TTL`].
pub(crate) fn derive_cache_ttl(polling_interval: Duration) -> Duration {
    polling_interval
        .saturating_sub(CACHE_TTL_MARGIN)
        .max(MIN_CACHE_TTL)
}

/// Resolve the HTTP bind port with priority: env var -> default
pub(crate) fn resolve_port() -> u16 {
    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    DEFAULT_PORT
}

/// Resolve the polling interval with priority: env var -> default
pub(crate) fn resolve_polling_interval_ms() -> u64 {
    if let Ok(env_interval) = env::var(POLLING_INTERVAL_ENV_VAR)
        && let Ok(interval) = env_interval.parse::<u64>()
    {
        return interval;
    }

    DEFAULT_POLLING_INTERVAL_MS
}

/// Resolve the handshake timeout with priority: env var -> default
pub(crate) fn resolve_connect_timeout() -> u64 {
    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the per-probe command timeout with priority: env var -> default
pub(crate) fn resolve_command_timeout() -> u64 {
    if let Ok(env_timeout) = env::var(COMMAND_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_COMMAND_TIMEOUT_SECS
}

/// Resolve the max retries value with priority: env var -> default
pub(crate) fn resolve_max_retries() -> u32 {
    if let Ok(env_retries) = env::var(MAX_RETRIES_ENV_VAR)
        && let Ok(retries) = env_retries.parse::<u32>()
    {
        return retries;
    }

    DEFAULT_MAX_RETRIES
}

/// Resolve the retry delay value with priority: env var -> default
pub(crate) fn resolve_retry_delay_ms() -> u64 {
    if let Ok(env_delay) = env::var(RETRY_DELAY_MS_ENV_VAR)
        && let Ok(delay) = env_delay.parse::<u64>()
    {
        return delay;
    }

    DEFAULT_RETRY_DELAY_MS
}
