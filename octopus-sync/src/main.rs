use anyhow::{bail, Result};
use octopus_sync::{config::AppConfig, metrics_server, observability, SyncEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let http = octopus_sync::http_client(&cfg)?;
    let engine = SyncEngine::new(
        octopus_sync::source(&cfg, http.clone()),
        octopus_sync::sink(&cfg, http),
        cfg.sync_settings(),
    );

    // Meters run one after another; a failure is reported but does not stop the next.
    let outcomes = engine.sync_meters(&cfg.meters()).await;

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_err())
        .map(|(serial, _)| serial.as_str())
        .collect();

    for (serial, outcome) in &outcomes {
        if let Ok(report) = outcome {
            tracing::info!(
                meter = %serial,
                pages = report.pages,
                readings = report.readings,
                cold_start = report.cold_start,
                feed_created = ?report.feed_created,
                "sync complete"
            );
        }
    }

    if !failed.is_empty() {
        bail!("sync failed for meter(s): {}", failed.join(", "));
    }

    Ok(())
}
