use std::{collections::HashMap, sync::Mutex};

use meter_client::{domain::timestamps, ConsumptionPage, MeterDescriptor, ProcessChain, RawReading, ReadingBatch};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::pipeline::{ConsumptionSource, FeedSpec, InputState, Lookup, SyncError, TimeSeriesSink};

/// `count` consecutive half-hour readings starting at `start` (epoch seconds).
pub fn half_hourly(start: i64, count: usize, consumption: f64) -> Vec<RawReading> {
    (0..count as i64)
        .map(|i| {
            let from = timestamps::from_unix_seconds(start + i * 1800).unwrap();
            let to = timestamps::from_unix_seconds(start + (i + 1) * 1800).unwrap();
            RawReading {
                interval_start: from.format(&Rfc3339).unwrap(),
                interval_end: to.format(&Rfc3339).unwrap(),
                consumption,
            }
        })
        .collect()
}

/// A provider backed by an in-memory archive per meter serial. Pages are cut
/// the way the real listing does: everything starting at or after
/// `period_from`, ascending, at most `page_size` entries.
#[derive(Default)]
pub struct FakeSource {
    archive: HashMap<String, Vec<RawReading>>,
    unknown_meters: Vec<String>,
    fail_on_request: Option<usize>,
    requests: Mutex<Vec<(String, OffsetDateTime, u32)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(mut self, serial: &str, readings: Vec<RawReading>) -> Self {
        self.archive.entry(serial.to_string()).or_default().extend(readings);
        self
    }

    pub fn with_unknown_meter(mut self, serial: &str) -> Self {
        self.unknown_meters.push(serial.to_string());
        self
    }

    /// Fail the `index`-th consumption request (0-based).
    pub fn failing_on_request(mut self, index: usize) -> Self {
        self.fail_on_request = Some(index);
        self
    }

    pub fn requests(&self) -> Vec<(String, OffsetDateTime, u32)> {
        self.requests.lock().unwrap().clone()
    }

    /// `period_from` of every request for `serial`, as sent on the wire.
    pub fn periods(&self, serial: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|(s, _, _)| s == serial)
            .map(|(_, from, _)| timestamps::format_period(from).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl ConsumptionSource for FakeSource {
    async fn probe_meter(&self, meter: &MeterDescriptor) -> Result<(), SyncError> {
        if self.unknown_meters.contains(&meter.serial) {
            return Err(SyncError::MeterNotFound(meter.meter_point_id.clone()));
        }
        Ok(())
    }

    async fn list_consumption(
        &self,
        meter: &MeterDescriptor,
        period_from: OffsetDateTime,
        page_size: u32,
    ) -> Result<ConsumptionPage, SyncError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((meter.serial.clone(), period_from, page_size));
            requests.len() - 1
        };
        if self.fail_on_request == Some(index) {
            return Err(SyncError::SourceUnavailable("unexpected status 503".to_string()));
        }

        let results = self
            .archive
            .get(&meter.serial)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| timestamps::parse_utc(&r.interval_start).unwrap() >= period_from)
                    .take(page_size as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(ConsumptionPage {
            results,
            count: None,
            next: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeInput {
    pub id: i64,
    pub last_timestamp: Option<i64>,
    pub process_list: String,
}

#[derive(Default)]
struct SinkState {
    inputs: HashMap<String, FakeInput>,
    next_input_id: i64,
    writes: Vec<(String, ReadingBatch)>,
    feeds: Vec<FeedSpec>,
    bindings: Vec<(i64, String)>,
}

/// An emoncms stand-in that creates inputs on first write, like the real one.
pub struct FakeSink {
    state: Mutex<SinkState>,
    feed_reply: Option<i64>,
    fail_bulk: bool,
    hide_input_ids: bool,
    /// Acknowledge bulk writes without storing them or creating inputs.
    swallow_writes: bool,
}

fn key(node: &str, name: &str) -> String {
    format!("{node}/{name}")
}

impl FakeSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                next_input_id: 1,
                ..SinkState::default()
            }),
            feed_reply: Some(42),
            fail_bulk: false,
            hide_input_ids: false,
            swallow_writes: false,
        }
    }

    pub fn with_input(self, node: &str, name: &str, last_timestamp: Option<i64>, process_list: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_input_id;
            state.next_input_id += 1;
            state.inputs.insert(
                key(node, name),
                FakeInput {
                    id,
                    last_timestamp,
                    process_list: process_list.to_string(),
                },
            );
        }
        self
    }

    pub fn rejecting_feeds(mut self) -> Self {
        self.feed_reply = None;
        self
    }

    pub fn failing_bulk(mut self) -> Self {
        self.fail_bulk = true;
        self
    }

    pub fn swallowing_writes(mut self) -> Self {
        self.swallow_writes = true;
        self
    }

    pub fn hiding_input_ids(mut self) -> Self {
        self.hide_input_ids = true;
        self
    }

    pub fn writes(&self) -> Vec<(String, ReadingBatch)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn writes_for(&self, name: &str) -> Vec<ReadingBatch> {
        self.writes()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, batch)| batch)
            .collect()
    }

    pub fn feeds(&self) -> Vec<FeedSpec> {
        self.state.lock().unwrap().feeds.clone()
    }

    pub fn bindings(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().bindings.clone()
    }

    pub fn stored(&self, node: &str, name: &str) -> Option<FakeInput> {
        self.state.lock().unwrap().inputs.get(&key(node, name)).cloned()
    }
}

#[async_trait::async_trait]
impl TimeSeriesSink for FakeSink {
    async fn input(&self, node: &str, name: &str) -> Result<Lookup<InputState>, SyncError> {
        let state = self.state.lock().unwrap();
        let Some(input) = state.inputs.get(&key(node, name)) else {
            return Ok(Lookup::NotFound);
        };
        let process_chain: ProcessChain = input
            .process_list
            .parse()
            .map_err(|e| SyncError::MalformedResponse(format!("{e}")))?;
        Ok(Lookup::Found(InputState {
            last_timestamp: input.last_timestamp,
            process_chain,
        }))
    }

    async fn input_id(&self, node: &str, name: &str) -> Result<Lookup<i64>, SyncError> {
        if self.hide_input_ids {
            return Ok(Lookup::NotFound);
        }
        let state = self.state.lock().unwrap();
        Ok(state.inputs.get(&key(node, name)).map(|i| i.id).into())
    }

    async fn create_feed(&self, feed: &FeedSpec) -> Result<Option<i64>, SyncError> {
        self.state.lock().unwrap().feeds.push(feed.clone());
        Ok(self.feed_reply)
    }

    async fn bind_process_chain(&self, input_id: i64, chain: &ProcessChain) -> Result<bool, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.bindings.push((input_id, chain.to_string()));
        match state.inputs.values_mut().find(|i| i.id == input_id) {
            Some(input) => {
                input.process_list = chain.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bulk_insert(&self, batch: &ReadingBatch, node: &str, name: &str) -> Result<bool, SyncError> {
        let Some(last) = batch.last_timestamp() else {
            return Ok(false);
        };
        if self.fail_bulk {
            return Err(SyncError::SinkUnavailable("unexpected status 500".to_string()));
        }
        if self.swallow_writes {
            return Ok(true);
        }

        let mut state = self.state.lock().unwrap();
        state.writes.push((name.to_string(), batch.clone()));

        let next_id = state.next_input_id;
        let input = state.inputs.entry(key(node, name)).or_insert_with(|| FakeInput {
            id: next_id,
            last_timestamp: None,
            process_list: String::new(),
        });
        input.last_timestamp = Some(input.last_timestamp.map_or(last, |t| t.max(last)));
        if input.id == next_id {
            state.next_input_id += 1;
        }
        Ok(true)
    }
}
