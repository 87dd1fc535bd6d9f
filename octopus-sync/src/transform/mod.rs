use meter_client::{domain::timestamps, RawReading, Reading, ReadingBatch};
use time::{macros::datetime, OffsetDateTime};

use crate::pipeline::SyncError;

fn rejected(reason: String) -> SyncError {
    metrics::counter!("transform_readings_rejected_total").increment(1);
    SyncError::MalformedResponse(reason)
}

fn parse_boundary(field: &str, raw: &str) -> Result<OffsetDateTime, SyncError> {
    timestamps::parse_utc(raw).map_err(|e| rejected(format!("invalid {field} {raw:?}: {e}")))
}

pub fn interval_start(raw: &RawReading) -> Result<OffsetDateTime, SyncError> {
    parse_boundary("interval_start", &raw.interval_start)
}

pub fn interval_end(raw: &RawReading) -> Result<OffsetDateTime, SyncError> {
    parse_boundary("interval_end", &raw.interval_end)
}

/// Convert one provider reading into a sink sample keyed by its interval
/// start.
///
/// Rules:
/// - consumption must be a finite number.
/// - interval start must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn convert_reading(raw: &RawReading) -> Result<Reading, SyncError> {
    if !raw.consumption.is_finite() {
        return Err(rejected(format!(
            "consumption {} at {} is not finite",
            raw.consumption, raw.interval_start
        )));
    }

    let start = interval_start(raw)?;

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if start < min_ts || start > max_ts {
        return Err(rejected(format!("interval start {start} out of allowed range")));
    }

    Ok(Reading {
        timestamp: start.unix_timestamp(),
        value: raw.consumption,
    })
}

/// Convert a page of readings, keeping provider order, into a batch.
pub fn to_batch(results: &[RawReading]) -> Result<ReadingBatch, SyncError> {
    let readings = results
        .iter()
        .map(convert_reading)
        .collect::<Result<Vec<_>, _>>()?;

    ReadingBatch::new(readings).map_err(|e| rejected(format!("page is not in ascending order: {e}")))
}
