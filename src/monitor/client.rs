//! SSH connection establishment and remote command execution.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: Build the russh client configuration with
//!    keepalive tuning from the host's credential entry. Pooled sessions
//!    are persistent, so no inactivity timeout is set; the pool's idle
//!    eviction owns that decision.
//!
//! 2. **Connection Establishment**: TCP + handshake bounded by the
//!    configured connect timeout.
//!
//! 3. **Authentication**: Password or private-key file, via the
//!    [`AuthChain`] built from the credential entry.
//!
//! 4. **Command Execution**: Open a session channel per command and
//!    collect stdout, stderr and exit code from channel messages.
//!
//! ## Retry Strategy
//!
//! One establish attempt may internally retry transient errors with
//! exponential backoff and jitter via the `backon` crate, capped at
//! [`MAX_RETRY_DELAY`](super::config::MAX_RETRY_DELAY). Authentication
//! failures are never retried to avoid account lockouts. The retries stay
//! inside the pool's single pending-connect future, so callers joining the
//! attempt still observe exactly one settlement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, Disconnect, client};
use tracing::{error, info, warn};

use super::auth::{AuthChain, AuthStrategy};
use super::config::{MAX_RETRY_DELAY, Settings};
use super::credentials::{AuthMaterial, HostCredential};
use super::error::{MonitorError, is_retryable_error};
use super::session::{CommandOutput, Connector, SessionTransport, SshClientHandler, Transport};

/// Build russh client configuration for a pooled session.
///
/// No inactivity timeout is set: the pool decides when a session dies, via
/// heartbeat failure or idle eviction. Keepalives ride along underneath at
/// the interval the credential entry asks for.
pub(crate) fn build_client_config(keepalive_interval: Duration) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(keepalive_interval),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// The russh-backed [`Connector`] used outside of tests.
pub struct SshConnector {
    connect_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl SshConnector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn establish(&self, credential: &HostCredential) -> Result<Transport, MonitorError> {
        let handle = connect_with_retry(
            credential,
            self.connect_timeout,
            self.max_retries,
            self.retry_delay,
        )
        .await?;

        Ok(Arc::new(RusshTransport { handle }))
    }
}

/// Connect with retry logic for transient errors.
///
/// Uses exponential backoff starting from `min_delay`, capped at
/// [`MAX_RETRY_DELAY`], with random jitter to prevent thundering herd.
async fn connect_with_retry(
    credential: &HostCredential,
    timeout: Duration,
    max_retries: u32,
    min_delay: Duration,
) -> Result<client::Handle<SshClientHandler>, MonitorError> {
    let attempt_counter = AtomicU32::new(0);

    // Clone the credential for the retry closure
    let credential = credential.clone();

    let backoff = ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(max_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);

        if current_attempt > 0 {
            warn!(
                "SSH connection retry attempt {} to {}@{}",
                current_attempt, credential.username, credential.address
            );
        }

        connect_once(&credential, timeout).await
    })
    .retry(backoff)
    .when(|e: &MonitorError| is_retryable_error(&e.to_string()))
    .notify(|err, dur| {
        warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
    })
    .await;

    if let Err(e) = &result {
        error!(
            "SSH connection to {}@{} failed after {} attempt(s): {}",
            credential.username,
            credential.address,
            attempt_counter.load(Ordering::SeqCst),
            e
        );
    }

    result
}

/// Establish an SSH connection and authenticate, bounded by `timeout`.
async fn connect_once(
    credential: &HostCredential,
    timeout: Duration,
) -> Result<client::Handle<SshClientHandler>, MonitorError> {
    let config = build_client_config(credential.keepalive_interval());
    let handler = SshClientHandler;

    let connect_future = client::connect(
        config,
        (credential.address.as_str(), credential.port),
        handler,
    );

    let mut handle = tokio::time::timeout(timeout, connect_future)
        .await
        .map_err(|_| {
            MonitorError::Connect(format!(
                "handshake to {} timed out after {:?}",
                credential.address, timeout
            ))
        })?
        .map_err(|e| {
            MonitorError::Connect(format!("failed to connect to {}: {}", credential.address, e))
        })?;

    let auth_chain = match credential.auth_material()? {
        AuthMaterial::Password(password) => AuthChain::new().with_password(password),
        AuthMaterial::PrivateKey(key_path) => AuthChain::new().with_key(key_path),
    };

    let success = auth_chain
        .authenticate(&mut handle, &credential.username)
        .await
        .map_err(MonitorError::Connect)?;

    if !success {
        return Err(MonitorError::Connect(format!(
            "authentication failed for {}@{}",
            credential.username, credential.address
        )));
    }

    info!(
        "SSH session established to {}@{}:{}",
        credential.username, credential.address, credential.port
    );

    Ok(handle)
}

/// [`SessionTransport`] over a live russh client handle.
pub struct RusshTransport {
    handle: client::Handle<SshClientHandler>,
}

#[async_trait]
impl SessionTransport for RusshTransport {
    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, MonitorError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| MonitorError::Probe(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| MonitorError::Probe(format!("failed to execute command: {}", e)))?;

        // Pre-allocate buffers to reduce reallocations during output collection
        let mut stdout = Vec::with_capacity(4096);
        let mut stderr = Vec::with_capacity(1024);
        let mut exit_code: Option<u32> = None;

        let result = tokio::time::timeout(timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.extend_from_slice(&data);
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        // ext == 1 is stderr in SSH protocol
                        if ext == 1 {
                            stderr.extend_from_slice(&data);
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = Some(exit_status);
                    }
                    Some(ChannelMsg::Eof) => {
                        // Continue to wait for exit status if not received yet
                        if exit_code.is_some() {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) => {
                        break;
                    }
                    Some(_) => {
                        // Ignore other message types
                    }
                    None => {
                        // Channel closed
                        break;
                    }
                }
            }
        })
        .await;

        // Always close the channel gracefully to keep the session alive
        let _ = channel.close().await;

        if result.is_err() {
            return Err(MonitorError::Probe(format!(
                "command timed out after {:?}: {}",
                timeout, command
            )));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: exit_code.map(|c| c as i32).unwrap_or(-1),
        })
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "english")
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod client_config {
        use super::*;

        #[test]
        fn test_pooled_sessions_have_no_inactivity_timeout() {
            let config = build_client_config(Duration::from_secs(30));
            assert_eq!(config.inactivity_timeout, None);
        }

        #[test]
        fn test_keepalive_tuning_is_applied() {
            let config = build_client_config(Duration::from_secs(15));
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(15)));
            assert_eq!(config.keepalive_max, 3);
        }
    }
}
