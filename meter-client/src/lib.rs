pub mod api;
pub mod domain;

pub use api::{emoncms::EmoncmsClient, error::ApiError, octopus::OctopusClient};
pub use domain::{
    ConsumptionPage, MeterDescriptor, MeterKind, ProcessChain, ProcessEntry, RawReading, Reading,
    ReadingBatch,
};
