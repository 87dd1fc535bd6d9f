use std::fs;

use meter_client::{api::octopus::DEFAULT_BASE_URL, MeterDescriptor, MeterKind};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    engine::{FeedTemplate, SyncSettings, DEFAULT_HISTORY_FLOOR, DEFAULT_PAGE_SIZE},
    pipeline::SyncError,
};

fn default_octopus_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_history_floor() -> OffsetDateTime {
    DEFAULT_HISTORY_FLOOR
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    /// MPAN for electricity, MPRN for gas.
    #[serde(alias = "mpan", alias = "mprn")]
    pub meter_point_id: String,
    pub serial: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OctopusConfig {
    #[serde(default = "default_octopus_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_history_floor", with = "time::serde::rfc3339")]
    pub history_floor: OffsetDateTime,
    pub electricity: Option<MeterConfig>,
    pub gas: Option<MeterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub tag: String,
    pub datatype: u32,
    pub engine: u32,
    pub interval_secs: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let template = FeedTemplate::default();
        Self {
            tag: template.tag,
            datatype: template.datatype,
            engine: template.engine,
            interval_secs: template.interval_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmoncmsConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub node: String,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// Unset leaves the transport default (no timeout).
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub octopus: OctopusConfig,
    pub emoncms: EmoncmsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("OCTOPUS_SYNC_CONFIG").unwrap_or_else(|_| "octopus-sync.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let mut cfg = Self::from_toml_str(&contents)?;

        if let Ok(key) = env::var("OCTOPUS_API_KEY") {
            cfg.octopus.api_key = key;
        }
        if let Ok(key) = env::var("EMONCMS_API_KEY") {
            cfg.emoncms.api_key = key;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let invalid = |msg: &str| Err(SyncError::Configuration(msg.to_string()));

        if self.octopus.api_key.trim().is_empty() {
            return invalid("octopus.api_key not provided");
        }
        if self.octopus.page_size == 0 {
            return invalid("octopus.page_size must be at least 1");
        }
        if self.emoncms.api_key.trim().is_empty() {
            return invalid("emoncms.api_key not provided");
        }
        if self.emoncms.base_url.trim().is_empty() {
            return invalid("emoncms.base_url not provided");
        }
        if self.emoncms.node.trim().is_empty() {
            return invalid("emoncms.node not provided");
        }

        for (kind, meter) in self.configured_meters() {
            if meter.meter_point_id.trim().is_empty() {
                return Err(SyncError::Configuration(format!("{kind} meter point id not supplied")));
            }
            if meter.serial.trim().is_empty() {
                return Err(SyncError::Configuration(format!("{kind} meter serial number not supplied")));
            }
        }

        match (&self.octopus.electricity, &self.octopus.gas) {
            (None, None) => invalid("no electricity or gas meter configured"),
            (Some(e), Some(g)) if e.serial.trim() == g.serial.trim() => {
                invalid("gas and electric meter serial numbers are the same")
            }
            _ => Ok(()),
        }
    }

    fn configured_meters(&self) -> impl Iterator<Item = (MeterKind, &MeterConfig)> {
        [
            (MeterKind::Electricity, self.octopus.electricity.as_ref()),
            (MeterKind::Gas, self.octopus.gas.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, meter)| meter.map(|m| (kind, m)))
    }

    /// Meters to sync, electricity first.
    pub fn meters(&self) -> Vec<MeterDescriptor> {
        self.configured_meters()
            .map(|(kind, m)| {
                let meter = MeterDescriptor::new(kind, m.meter_point_id.trim(), m.serial.trim());
                match &m.unit {
                    Some(unit) => meter.with_unit(unit.clone()),
                    None => meter,
                }
            })
            .collect()
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let feed = &self.emoncms.feed;
        SyncSettings {
            node: self.emoncms.node.clone(),
            page_size: self.octopus.page_size,
            history_floor: self.octopus.history_floor,
            feed: FeedTemplate {
                tag: feed.tag.clone(),
                datatype: feed.datatype,
                engine: feed.engine,
                interval_secs: feed.interval_secs,
            },
        }
    }
}
