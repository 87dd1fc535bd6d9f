use meter_client::{ConsumptionPage, MeterDescriptor, MeterKind, OctopusClient};
use reqwest::StatusCode;
use time::OffsetDateTime;

use crate::pipeline::{ConsumptionSource, SyncError};

/// Field every electricity meter-point record carries (grid supply point).
const METER_POINT_MARKER: &str = "gsp";

/// Consumption readings pulled from the Octopus Energy API.
#[derive(Clone)]
pub struct OctopusSource {
    client: OctopusClient,
}

impl OctopusSource {
    pub fn new(client: OctopusClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ConsumptionSource for OctopusSource {
    async fn probe_meter(&self, meter: &MeterDescriptor) -> Result<(), SyncError> {
        // Gas meter points are not exposed for lookup.
        if meter.kind != MeterKind::Electricity {
            return Ok(());
        }

        let point = match self.client.meter_point(meter.kind, &meter.meter_point_id).await {
            Ok(point) => point,
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                return Err(SyncError::MeterNotFound(format!(
                    "electricity meter point {} is unknown to the provider",
                    meter.meter_point_id
                )));
            }
            Err(e) => {
                metrics::counter!("octopus_source_errors_total").increment(1);
                return Err(SyncError::from_source(e));
            }
        };

        if point.get(METER_POINT_MARKER).is_none() {
            return Err(SyncError::MeterNotFound(format!(
                "electricity meter point (MPAN) may be incorrect ({})",
                meter.meter_point_id
            )));
        }

        Ok(())
    }

    async fn list_consumption(
        &self,
        meter: &MeterDescriptor,
        period_from: OffsetDateTime,
        page_size: u32,
    ) -> Result<ConsumptionPage, SyncError> {
        tracing::info!(
            meter = %meter.serial,
            kind = %meter.kind,
            page_size,
            %period_from,
            "requesting consumption from Octopus"
        );

        match self.client.consumption(meter, period_from, page_size).await {
            Ok(page) => {
                tracing::debug!(
                    meter = %meter.serial,
                    readings = page.results.len(),
                    available = ?page.count,
                    more = page.next.is_some(),
                    "consumption page received"
                );
                metrics::counter!("octopus_pages_fetched_total", "kind" => meter.kind.to_string()).increment(1);
                metrics::counter!("octopus_readings_fetched_total", "kind" => meter.kind.to_string())
                    .increment(page.results.len() as u64);
                Ok(page)
            }
            Err(e) => {
                tracing::error!(
                    meter = %meter.serial,
                    %period_from,
                    status = ?e.status(),
                    error = %e,
                    "consumption request failed"
                );
                metrics::counter!("octopus_source_errors_total").increment(1);
                Err(SyncError::from_source(e))
            }
        }
    }
}
