//! Session transport and connector seams.
//!
//! The pool and the command runner only ever see `SessionTransport` and
//! `Connector` trait objects; the russh-backed implementations live in
//! `client`. The seams exist so the connection lifecycle rules can be
//! exercised without a live SSH server.
//!
//! # Thread Safety
//!
//! `client::Handle` is not `Clone`, so transports are shared as
//! `Arc<dyn SessionTransport>` across the pool, the heartbeat sweep and
//! in-flight metric requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{client, keys};

use super::credentials::HostCredential;
use super::error::MonitorError;

/// Client handler for russh that accepts all host keys.
///
/// This implementation accepts all server public keys without verification,
/// similar to `StrictHostKeyChecking=no` in OpenSSH configuration. In
/// production environments, you should verify against a known_hosts file.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Output of one remote command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// An authenticated, reusable remote-execution channel to one host.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Execute a command and collect its output, bounded by `timeout`.
    /// Expiry is an error; a probe that times out counts as failed.
    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, MonitorError>;

    /// Whether the underlying channel has been closed by either side.
    fn is_closed(&self) -> bool;

    /// Best-effort disconnect.
    async fn close(&self);
}

pub type Transport = Arc<dyn SessionTransport>;

/// Performs the handshake + authentication for one host.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn establish(&self, credential: &HostCredential) -> Result<Transport, MonitorError>;
}
