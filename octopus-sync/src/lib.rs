pub mod config;
pub mod engine;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

#[cfg(test)]
mod mock_http;

pub use engine::{SyncEngine, SyncReport, SyncSettings};
pub use pipeline::{ConsumptionSource, Lookup, SyncError, TimeSeriesSink};

use std::time::Duration;

use config::AppConfig;
use meter_client::{EmoncmsClient, OctopusClient};

/// The one HTTP client a run uses for both APIs.
pub fn http_client(cfg: &AppConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(concat!("octopus-sync/", env!("CARGO_PKG_VERSION")));
    if let Some(secs) = cfg.http.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

pub fn source(cfg: &AppConfig, http: reqwest::Client) -> sources::OctopusSource {
    sources::OctopusSource::new(OctopusClient::new(
        http,
        cfg.octopus.base_url.clone(),
        cfg.octopus.api_key.clone(),
    ))
}

pub fn sink(cfg: &AppConfig, http: reqwest::Client) -> sinks::EmoncmsSink {
    sinks::EmoncmsSink::new(EmoncmsClient::new(
        http,
        cfg.emoncms.base_url.clone(),
        cfg.emoncms.api_key.clone(),
    ))
}
