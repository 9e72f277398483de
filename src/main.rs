#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use hostpulse::monitor::api;
use hostpulse::monitor::client::SshConnector;
use hostpulse::monitor::config::{self, Settings};
use hostpulse::monitor::credentials::CredentialStore;
use hostpulse::monitor::service::Monitor;
use poem::{EndpointExt, Server, listener::TcpListener, middleware::Cors, middleware::Tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let settings = Settings::from_env();
    let credentials = CredentialStore::new(config::CREDENTIALS_PATH, config::CREDENTIALS_TTL);
    let connector = Arc::new(SshConnector::new(&settings));
    let monitor = Arc::new(Monitor::new(&settings, credentials, connector));

    // Heartbeat, idle eviction and cache sweeps run for the process lifetime
    monitor.start();

    let app = api::routes()
        .data(Arc::clone(&monitor))
        .with(Cors::new())
        .with(Tracing);

    let addr = format!("0.0.0.0:{}", settings.port);
    info!(
        "Starting monitor server on {} (polling interval {:?}, cache ttl {:?})",
        addr, settings.polling_interval, settings.cache_ttl
    );

    Server::new(TcpListener::bind(addr))
        .name("hostpulse")
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            },
            Some(Duration::from_secs(5)),
        )
        .await?;

    // Best-effort close of every pooled session before exit
    monitor.shutdown().await;

    Ok(())
}
