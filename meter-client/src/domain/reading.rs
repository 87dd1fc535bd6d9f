use serde::{Deserialize, Serialize};

/// One consumption interval as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub interval_start: String,
    pub interval_end: String,
    pub consumption: f64,
}

/// A page of the consumption listing. `results` is required; an empty list
/// means there is nothing at or after the requested `period_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPage {
    pub results: Vec<RawReading>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
}

impl ConsumptionPage {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A single sample: interval start in UTC epoch seconds plus its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("reading {index} at {next} does not follow previous timestamp {previous}")]
pub struct BatchOrderError {
    pub index: usize,
    pub previous: i64,
    pub next: i64,
}

/// Readings in strictly ascending timestamp order.
///
/// The bulk encoding writes every timestamp as an offset back from the last
/// one, so the ordering is checked once here rather than at the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingBatch {
    readings: Vec<Reading>,
}

impl ReadingBatch {
    pub fn new(readings: Vec<Reading>) -> Result<Self, BatchOrderError> {
        for (index, pair) in readings.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(BatchOrderError {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                });
            }
        }
        Ok(Self { readings })
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.readings.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// `(seconds before the last reading, value)` pairs in batch order.
    /// Every offset is `<= 0` and the final one is exactly `0`.
    pub fn offsets(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        let last = self.last_timestamp().unwrap_or_default();
        self.readings.iter().map(move |r| (r.timestamp - last, r.value))
    }
}
