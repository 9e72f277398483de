//! TTL-cached host credential table.
//!
//! Credentials are read from `ssh-config.json` (the file the dashboard
//! ships next to the server), keyed by host address. The whole table is
//! reloaded once a staleness TTL elapses, not on file-watch; concurrent
//! requests during a reload may observe either the old or the new table
//! for the same address (eventual consistency).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::error::MonitorError;

fn default_port() -> u16 {
    22
}

/// Credentials for one monitored host. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct HostCredential {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<PathBuf>,
    #[serde(default, rename = "keepaliveIntervalSecs")]
    pub keepalive_interval_secs: Option<u64>,
}

/// The authentication material a credential entry resolves to: exactly one
/// of a password or a private-key file.
#[derive(Debug, Clone)]
pub enum AuthMaterial {
    Password(String),
    PrivateKey(PathBuf),
}

impl HostCredential {
    /// Resolve the entry's auth material, rejecting ambiguous entries.
    pub fn auth_material(&self) -> Result<AuthMaterial, MonitorError> {
        match (&self.password, &self.private_key) {
            (Some(password), None) => Ok(AuthMaterial::Password(password.clone())),
            (None, Some(key_path)) => Ok(AuthMaterial::PrivateKey(key_path.clone())),
            (Some(_), Some(_)) => Err(MonitorError::Config(format!(
                "credential entry for {} specifies both a password and a private key",
                self.address
            ))),
            (None, None) => Err(MonitorError::Config(format!(
                "credential entry for {} specifies no password or private key",
                self.address
            ))),
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(super::config::DEFAULT_KEEPALIVE_INTERVAL)
    }
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(rename = "sshConfigs")]
    ssh_configs: Vec<HostCredential>,
}

struct LoadedTable {
    loaded_at: Instant,
    by_address: HashMap<String, HostCredential>,
}

impl LoadedTable {
    fn credential(&self, address: &str) -> Result<HostCredential, MonitorError> {
        self.by_address.get(address).cloned().ok_or_else(|| {
            MonitorError::Config(format!("no ssh credential entry for {address}"))
        })
    }
}

/// Loads and caches the credential table with a refresh TTL.
pub struct CredentialStore {
    path: PathBuf,
    ttl: Duration,
    table: RwLock<Option<LoadedTable>>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            table: RwLock::new(None),
        }
    }

    /// Look up the credentials for an address, reloading the whole table
    /// first if it is missing or stale.
    pub async fn lookup(&self, address: &str) -> Result<HostCredential, MonitorError> {
        {
            let table = self.table.read().await;
            if let Some(loaded) = table.as_ref()
                && loaded.loaded_at.elapsed() < self.ttl
            {
                return loaded.credential(address);
            }
        }

        let mut table = self.table.write().await;
        // Another task may have reloaded while we waited for the write lock
        if let Some(loaded) = table.as_ref()
            && loaded.loaded_at.elapsed() < self.ttl
        {
            return loaded.credential(address);
        }

        let loaded = load_table(&self.path).await?;
        info!(
            path = %self.path.display(),
            entries = loaded.by_address.len(),
            "Reloaded ssh credential table"
        );
        let credential = loaded.credential(address);
        *table = Some(loaded);
        credential
    }

    /// Store with a pre-populated table, for tests that must not touch disk.
    #[cfg(test)]
    pub(crate) fn preloaded(entries: Vec<HostCredential>) -> Self {
        let by_address = entries
            .into_iter()
            .map(|credential| (credential.address.clone(), credential))
            .collect();
        Self {
            path: PathBuf::from("ssh-config.json"),
            ttl: Duration::from_secs(3600),
            table: RwLock::new(Some(LoadedTable {
                loaded_at: Instant::now(),
                by_address,
            })),
        }
    }
}

async fn load_table(path: &Path) -> Result<LoadedTable, MonitorError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        MonitorError::Config(format!(
            "failed to read credential table {}: {}",
            path.display(),
            e
        ))
    })?;

    let file: CredentialFile = serde_json::from_str(&raw).map_err(|e| {
        MonitorError::Config(format!(
            "failed to parse credential table {}: {}",
            path.display(),
            e
        ))
    })?;

    let by_address = file
        .ssh_configs
        .into_iter()
        .map(|credential| (credential.address.clone(), credential))
        .collect();

    Ok(LoadedTable {
        loaded_at: Instant::now(),
        by_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_entry(address: &str) -> HostCredential {
        HostCredential {
            address: address.to_string(),
            port: 22,
            username: "root".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
            keepalive_interval_secs: None,
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_parses_password_entry_with_defaults() {
            let file: CredentialFile = serde_json::from_str(
                r#"{"sshConfigs":[{"ip":"10.0.0.1","username":"root","password":"secret"}]}"#,
            )
            .unwrap();

            let entry = &file.ssh_configs[0];
            assert_eq!(entry.address, "10.0.0.1");
            assert_eq!(entry.port, 22);
            assert_eq!(entry.username, "root");
            assert_eq!(entry.password.as_deref(), Some("secret"));
            assert!(entry.private_key.is_none());
        }

        #[test]
        fn test_parses_key_entry_with_port_and_keepalive() {
            let file: CredentialFile = serde_json::from_str(
                r#"{"sshConfigs":[{"ip":"10.0.0.2","port":2222,"username":"ops","privateKey":"/home/ops/.ssh/id_ed25519","keepaliveIntervalSecs":15}]}"#,
            )
            .unwrap();

            let entry = &file.ssh_configs[0];
            assert_eq!(entry.port, 2222);
            assert_eq!(
                entry.private_key.as_deref(),
                Some(Path::new("/home/ops/.ssh/id_ed25519"))
            );
            assert_eq!(entry.keepalive_interval(), Duration::from_secs(15));
        }

        #[test]
        fn test_keepalive_defaults_when_absent() {
            let entry = password_entry("10.0.0.1");
            assert_eq!(
                entry.keepalive_interval(),
                crate::monitor::config::DEFAULT_KEEPALIVE_INTERVAL
            );
        }
    }

    mod auth_material {
        use super::*;

        #[test]
        fn test_password_entry_resolves_to_password() {
            let entry = password_entry("10.0.0.1");
            assert!(matches!(
                entry.auth_material(),
                Ok(AuthMaterial::Password(p)) if p == "secret"
            ));
        }

        #[test]
        fn test_both_password_and_key_is_rejected() {
            let mut entry = password_entry("10.0.0.1");
            entry.private_key = Some(PathBuf::from("/key"));
            assert!(matches!(
                entry.auth_material(),
                Err(MonitorError::Config(_))
            ));
        }

        #[test]
        fn test_neither_password_nor_key_is_rejected() {
            let mut entry = password_entry("10.0.0.1");
            entry.password = None;
            assert!(matches!(
                entry.auth_material(),
                Err(MonitorError::Config(_))
            ));
        }
    }

    mod lookup {
        use super::*;

        #[tokio::test]
        async fn test_missing_entry_is_a_config_error() {
            let store = CredentialStore::preloaded(vec![password_entry("10.0.0.1")]);
            let error = store.lookup("10.0.0.5").await.unwrap_err();
            assert!(matches!(error, MonitorError::Config(_)));
            assert!(error.to_string().contains("10.0.0.5"));
        }

        #[tokio::test]
        async fn test_known_entry_is_returned() {
            let store = CredentialStore::preloaded(vec![password_entry("10.0.0.1")]);
            let credential = store.lookup("10.0.0.1").await.unwrap();
            assert_eq!(credential.username, "root");
        }

        #[tokio::test]
        async fn test_missing_file_is_a_config_error() {
            let store = CredentialStore::new(
                "/nonexistent/ssh-config.json",
                Duration::from_secs(300),
            );
            let error = store.lookup("10.0.0.1").await.unwrap_err();
            assert!(matches!(error, MonitorError::Config(_)));
        }

        #[tokio::test]
        async fn test_loads_table_from_disk() {
            let path = std::env::temp_dir().join("hostpulse-credentials-test.json");
            std::fs::write(
                &path,
                r#"{"sshConfigs":[{"ip":"192.168.7.7","username":"admin","password":"pw"}]}"#,
            )
            .unwrap();

            let store = CredentialStore::new(&path, Duration::from_secs(300));
            let credential = store.lookup("192.168.7.7").await.unwrap();
            assert_eq!(credential.username, "admin");

            std::fs::remove_file(&path).ok();
        }
    }
}
