use reqwest::Client;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use super::{error::ApiError, read_body};
use crate::domain::{timestamps, ConsumptionPage, MeterDescriptor, MeterKind};

pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1";

/// Thin client for the Octopus Energy REST API.
///
/// Authenticates with HTTP basic auth, the API key as user name and an
/// empty password.
#[derive(Clone)]
pub struct OctopusClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OctopusClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .query(query)
            .send()
            .await;
        let body = read_body(path, response).await?;

        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            endpoint: path.to_string(),
            detail: e.to_string(),
        })
    }

    /// Fetch the meter-point record. Used as an existence probe for an MPAN.
    pub async fn meter_point(&self, kind: MeterKind, meter_point_id: &str) -> Result<serde_json::Value, ApiError> {
        let path = meter_point_path(kind, meter_point_id);
        self.get_json(&path, &[]).await
    }

    /// One page of consumption for `meter`, ascending by interval, starting
    /// at `period_from`.
    pub async fn consumption(
        &self,
        meter: &MeterDescriptor,
        period_from: OffsetDateTime,
        page_size: u32,
    ) -> Result<ConsumptionPage, ApiError> {
        let path = consumption_path(meter);
        let query = [
            ("page_size", page_size.to_string()),
            ("order_by", "period".to_string()),
            ("period_from", timestamps::format_period(period_from)?),
        ];
        self.get_json(&path, &query).await
    }
}

pub fn meter_point_path(kind: MeterKind, meter_point_id: &str) -> String {
    format!(
        "/{}/{}/",
        kind.meter_point_collection(),
        urlencoding::encode(meter_point_id)
    )
}

pub fn consumption_path(meter: &MeterDescriptor) -> String {
    format!(
        "/{}/{}/meters/{}/consumption/",
        meter.kind.meter_point_collection(),
        urlencoding::encode(&meter.meter_point_id),
        urlencoding::encode(&meter.serial)
    )
}
