//! HTTP route handlers.
//!
//! Thin JSON glue over the [`Monitor`] coordinator:
//!
//! - `GET /api/metrics/:address` — cached-or-sampled host metrics
//! - `POST /api/toggle-ssh-monitor` — start/stop active monitoring
//! - `GET /api/ping/:address` — one-shot reachability check
//!
//! Addresses must be syntactically valid IP literals; anything else is a
//! 400 before any credential lookup happens. A failed metrics request
//! still answers with a best-effort body (stale cache or zeroed defaults)
//! alongside the 500.

use std::net::IpAddr;
use std::sync::Arc;

use poem::http::StatusCode;
use poem::web::{Data, Json, Path};
use poem::{IntoResponse, Response, Route, get, handler, post};
use tracing::error;

use super::ping;
use super::service::Monitor;
use super::types::{ToggleRequest, ToggleResponse};

/// The API route tree. Middleware and the shared [`Monitor`] are attached
/// by the caller.
pub fn routes() -> Route {
    Route::new()
        .at("/api/metrics/:address", get(get_metrics))
        .at("/api/toggle-ssh-monitor", post(toggle_ssh_monitor))
        .at("/api/ping/:address", get(ping_host))
}

fn invalid_address(address: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "invalid address",
            "message": format!("'{address}' is not a valid IP address"),
        })),
    )
        .into_response()
}

#[handler]
async fn get_metrics(Path(address): Path<String>, monitor: Data<&Arc<Monitor>>) -> Response {
    if address.parse::<IpAddr>().is_err() {
        return invalid_address(&address);
    }

    match monitor.metrics(&address).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => {
            error!(%address, error = %err, "metrics request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(monitor.failure_body(&address, &err)),
            )
                .into_response()
        }
    }
}

#[handler]
async fn toggle_ssh_monitor(
    Json(request): Json<ToggleRequest>,
    monitor: Data<&Arc<Monitor>>,
) -> Response {
    if request.address.parse::<IpAddr>().is_err() {
        return invalid_address(&request.address);
    }

    monitor.set_monitored(&request.address, request.enable).await;

    Json(ToggleResponse {
        success: true,
        address: request.address,
        enable: request.enable,
    })
    .into_response()
}

#[handler]
async fn ping_host(Path(address): Path<String>) -> Response {
    let Ok(ip) = address.parse::<IpAddr>() else {
        return invalid_address(&address);
    };

    Json(ping::ping(ip).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use poem::EndpointExt;
    use poem::test::TestClient;

    use crate::monitor::config::Settings;
    use crate::monitor::credentials::{CredentialStore, HostCredential};
    use crate::monitor::error::MonitorError;
    use crate::monitor::probes::tests::ScriptedTransport;
    use crate::monitor::session::{Connector, Transport};

    struct HealthyConnector;

    #[async_trait]
    impl Connector for HealthyConnector {
        async fn establish(
            &self,
            _credential: &HostCredential,
        ) -> Result<Transport, MonitorError> {
            Ok(Arc::new(ScriptedTransport::healthy()))
        }
    }

    fn test_app() -> TestClient<impl poem::Endpoint> {
        let settings = Settings {
            port: 0,
            polling_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(55),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_delay: Duration::from_millis(100),
        };
        let credentials = CredentialStore::preloaded(vec![HostCredential {
            address: "10.0.0.1".to_string(),
            port: 22,
            username: "root".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
            keepalive_interval_secs: None,
        }]);
        let monitor = Arc::new(Monitor::new(
            &settings,
            credentials,
            Arc::new(HealthyConnector),
        ));
        TestClient::new(routes().data(monitor))
    }

    #[tokio::test]
    async fn test_metrics_returns_snapshot_for_known_host() {
        let cli = test_app();

        let resp = cli.get("/api/metrics/10.0.0.1").send().await;
        resp.assert_status_is_ok();
        let json = resp.json().await;
        let value = json.value();
        value.object().get("cpu").assert_f64(12.5);
        value
            .object()
            .get("disk")
            .object()
            .get("usage")
            .assert_string("42%");
    }

    #[tokio::test]
    async fn test_metrics_rejects_non_ip_address() {
        let cli = test_app();

        let resp = cli.get("/api/metrics/not-an-ip").send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_for_unconfigured_host_is_500_with_defaults() {
        let cli = test_app();

        let resp = cli.get("/api/metrics/10.0.0.5").send().await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let json = resp.json().await;
        let value = json.value();
        let body = value.object();
        assert!(body.get("message").string().contains("configuration"));
        body.get("cpu").assert_f64(0.0);
        body.get("uptime").assert_string("unknown");
        body.get("disk").object().get("usage").assert_string("0%");
    }

    #[tokio::test]
    async fn test_toggle_roundtrip() {
        let cli = test_app();

        let resp = cli
            .post("/api/toggle-ssh-monitor")
            .body_json(&serde_json::json!({"address": "10.0.0.1", "enable": true}))
            .send()
            .await;
        resp.assert_status_is_ok();
        let json = resp.json().await;
        let value = json.value();
        value.object().get("success").assert_bool(true);
        value.object().get("enable").assert_bool(true);

        let resp = cli
            .post("/api/toggle-ssh-monitor")
            .body_json(&serde_json::json!({"address": "10.0.0.1", "enable": false}))
            .send()
            .await;
        resp.assert_status_is_ok();
    }

    #[tokio::test]
    async fn test_toggle_rejects_non_ip_address() {
        let cli = test_app();

        let resp = cli
            .post("/api/toggle-ssh-monitor")
            .body_json(&serde_json::json!({"address": "example.com", "enable": true}))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping_rejects_non_ip_address() {
        let cli = test_app();

        let resp = cli.get("/api/ping/localhost").send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }
}
