//! JSON value types shared by the HTTP API and the probe layer.

use serde::{Deserialize, Serialize};

/// Root-filesystem usage as reported by `df` (e.g. `"42%"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub usage: String,
}

/// One sampled set of host metrics. Immutable once assembled; the cache
/// timestamps it on insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu: f64,
    pub memory: f64,
    pub uptime: String,
    pub disk: DiskUsage,
}

impl MetricsSnapshot {
    /// The documented defaults substituted for failed probes, also used as
    /// the best-effort body when no cached snapshot exists.
    pub fn zeroed() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            uptime: "unknown".to_string(),
            disk: DiskUsage {
                usage: "0%".to_string(),
            },
        }
    }
}

/// Body returned with a 500 on a failed metrics request: the error detail
/// merged with the last cached snapshot (or zeroed defaults) so the
/// dashboard never renders undefined data.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsFailure {
    pub error: String,
    pub message: String,
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub address: String,
    pub enable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub address: String,
    pub enable: bool,
}

/// Reachability as derived from one platform ping invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Online,
    Offline,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: PingStatus,
    /// Round-trip time in milliseconds; `null` when offline or unparsable.
    pub latency: Option<f64>,
}

impl PingResponse {
    pub fn offline() -> Self {
        Self {
            status: PingStatus::Offline,
            latency: None,
        }
    }
}
