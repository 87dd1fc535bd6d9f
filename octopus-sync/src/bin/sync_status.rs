use anyhow::Result;
use meter_client::domain::timestamps;
use octopus_sync::{config::AppConfig, engine::resume_cursor, observability, Lookup, TimeSeriesSink};
use serde::Serialize;

/// What the sink holds for one configured meter.
#[derive(Serialize)]
struct InputStatus {
    meter: String,
    kind: String,
    node: String,
    exists: bool,
    last_timestamp: Option<i64>,
    next_period_from: Option<String>,
    process_list: Option<String>,
    logs_to_feed: bool,
}

/// Read-only status report, one JSON line per meter. Nothing is fetched from
/// the provider and nothing is written.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let sink = octopus_sync::sink(&cfg, octopus_sync::http_client(&cfg)?);
    let node = cfg.emoncms.node.as_str();

    for meter in cfg.meters() {
        let mut status = InputStatus {
            meter: meter.serial.clone(),
            kind: meter.kind.to_string(),
            node: node.to_string(),
            exists: false,
            last_timestamp: None,
            next_period_from: None,
            process_list: None,
            logs_to_feed: false,
        };

        if let Lookup::Found(input) = sink.input(node, &meter.serial).await? {
            status.exists = true;
            status.last_timestamp = input.last_timestamp;
            status.next_period_from = match input.last_timestamp.and_then(resume_cursor) {
                Some(next) => Some(timestamps::format_period(next)?),
                None => None,
            };
            status.logs_to_feed = input.process_chain.logs_first();
            status.process_list = Some(input.process_chain.to_string());
        }

        println!("{}", serde_json::to_string(&status)?);
    }

    Ok(())
}
