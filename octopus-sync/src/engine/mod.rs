use meter_client::{domain::timestamps, MeterDescriptor, ProcessChain, ProcessEntry, ReadingBatch};
use time::{macros::datetime, Duration, OffsetDateTime};

use crate::{
    pipeline::{ConsumptionSource, FeedSpec, InputState, Lookup, SyncError, TimeSeriesSink},
    transform,
};

#[cfg(test)]
mod fake;

pub const DEFAULT_PAGE_SIZE: u32 = 240;

/// Octopus Energy was founded in August 2015; no smart meter reading can
/// predate it.
pub const DEFAULT_HISTORY_FLOOR: OffsetDateTime = datetime!(2015-08-01 00:00:00 UTC);

/// Feed parameters shared by every meter; name and unit come from the meter.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTemplate {
    pub tag: String,
    pub datatype: u32,
    pub engine: u32,
    pub interval_secs: u32,
}

impl Default for FeedTemplate {
    fn default() -> Self {
        Self {
            tag: "Octopus Smart Meter".to_string(),
            datatype: 1,
            engine: 5,
            interval_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// emoncms node the meter inputs live under.
    pub node: String,
    pub page_size: u32,
    pub history_floor: OffsetDateTime,
    pub feed: FeedTemplate,
}

impl SyncSettings {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            page_size: DEFAULT_PAGE_SIZE,
            history_floor: DEFAULT_HISTORY_FLOOR,
            feed: FeedTemplate::default(),
        }
    }
}

/// First `period_from` after a sample the sink stored at `last_timestamp`.
/// `None` when either instant is outside the representable range.
pub fn resume_cursor(last_timestamp: i64) -> Option<OffsetDateTime> {
    timestamps::from_unix_seconds(last_timestamp)
        .ok()?
        .checked_add(Duration::seconds(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    ColdStartProbe,
    Provisioning,
    Backfilling,
    Drained,
}

enum SyncState {
    Uninitialized,
    /// `chain` is known when the input exists but has never logged a value.
    ColdStartProbe { chain: Option<ProcessChain> },
    /// `seed` is written first when the input does not exist yet; emoncms
    /// only creates an input on its first value and a process chain needs
    /// the input.
    Provisioning {
        cursor: OffsetDateTime,
        seed: Option<ReadingBatch>,
        chain: Option<ProcessChain>,
    },
    Backfilling {
        cursor: OffsetDateTime,
        last_written: Option<i64>,
    },
    Drained,
}

impl SyncState {
    fn phase(&self) -> SyncPhase {
        match self {
            SyncState::Uninitialized => SyncPhase::Uninitialized,
            SyncState::ColdStartProbe { .. } => SyncPhase::ColdStartProbe,
            SyncState::Provisioning { .. } => SyncPhase::Provisioning,
            SyncState::Backfilling { .. } => SyncPhase::Backfilling,
            SyncState::Drained => SyncPhase::Drained,
        }
    }
}

/// Summary of one meter's run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub serial: String,
    pub cold_start: bool,
    /// The cold-start reading was written to create the input.
    pub seeded: bool,
    pub feed_created: Option<i64>,
    /// Backfill pages written (the seed write is not counted).
    pub pages: u64,
    pub readings: u64,
    pub phases: Vec<SyncPhase>,
}

impl SyncReport {
    fn new(meter: &MeterDescriptor) -> Self {
        Self {
            serial: meter.serial.clone(),
            cold_start: false,
            seeded: false,
            feed_created: None,
            pages: 0,
            readings: 0,
            phases: Vec::new(),
        }
    }
}

/// Mirrors a meter's consumption from a source into a sink, resuming from
/// whatever the sink already holds.
///
/// Every remote call is awaited before the next one is issued, so a meter's
/// batches reach the sink one at a time and in order.
pub struct SyncEngine<S, K> {
    source: S,
    sink: K,
    settings: SyncSettings,
}

impl<S, K> SyncEngine<S, K>
where
    S: ConsumptionSource,
    K: TimeSeriesSink,
{
    pub fn new(source: S, sink: K, settings: SyncSettings) -> Self {
        Self {
            source,
            sink,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Sync each meter in turn. A failed meter does not stop the others.
    pub async fn sync_meters(&self, meters: &[MeterDescriptor]) -> Vec<(String, Result<SyncReport, SyncError>)> {
        let mut outcomes = Vec::with_capacity(meters.len());
        for meter in meters {
            let outcome = self.sync_meter(meter).await;
            if let Err(e) = &outcome {
                tracing::error!(meter = %meter.serial, kind = %meter.kind, error = %e, "meter sync failed");
                metrics::counter!("sync_meter_failures_total", "kind" => meter.kind.to_string()).increment(1);
            }
            outcomes.push((meter.serial.clone(), outcome));
        }
        outcomes
    }

    pub async fn sync_meter(&self, meter: &MeterDescriptor) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(meter);
        let mut state = SyncState::Uninitialized;

        loop {
            let phase = state.phase();
            report.phases.push(phase);
            tracing::debug!(meter = %meter.serial, ?phase, "sync phase");

            state = match state {
                SyncState::Uninitialized => self.resume_point(meter).await?,
                SyncState::ColdStartProbe { chain } => {
                    report.cold_start = true;
                    self.cold_start_probe(meter, chain).await?
                }
                SyncState::Provisioning { cursor, seed, chain } => {
                    self.provision(meter, seed, chain, &mut report).await?;
                    SyncState::Backfilling {
                        cursor,
                        last_written: None,
                    }
                }
                SyncState::Backfilling {
                    cursor,
                    last_written,
                } => self.backfill_page(meter, cursor, last_written, &mut report).await?,
                SyncState::Drained => break,
            };
        }

        tracing::info!(
            meter = %meter.serial,
            pages = report.pages,
            readings = report.readings,
            cold_start = report.cold_start,
            "meter is up to date"
        );
        Ok(report)
    }

    async fn resume_point(&self, meter: &MeterDescriptor) -> Result<SyncState, SyncError> {
        self.source.probe_meter(meter).await?;

        match self.sink.input(&self.settings.node, &meter.serial).await? {
            Lookup::Found(InputState {
                last_timestamp: Some(last_timestamp),
                process_chain,
            }) => {
                // The stored sample is already in the sink; start just past it.
                let cursor = resume_cursor(last_timestamp).ok_or_else(|| {
                    SyncError::MalformedResponse(format!(
                        "input {}/{} reports out-of-range time {last_timestamp}",
                        self.settings.node, meter.serial
                    ))
                })?;
                tracing::info!(
                    meter = %meter.serial,
                    last_timestamp,
                    period_from = %cursor,
                    "sink reports last timestamp"
                );
                Ok(SyncState::Provisioning {
                    cursor,
                    seed: None,
                    chain: Some(process_chain),
                })
            }
            Lookup::Found(InputState { process_chain, .. }) => Ok(SyncState::ColdStartProbe {
                chain: Some(process_chain),
            }),
            Lookup::NotFound => Ok(SyncState::ColdStartProbe { chain: None }),
        }
    }

    async fn cold_start_probe(
        &self,
        meter: &MeterDescriptor,
        chain: Option<ProcessChain>,
    ) -> Result<SyncState, SyncError> {
        let page = self
            .source
            .list_consumption(meter, self.settings.history_floor, 1)
            .await?;

        let Some(first) = page.results.first() else {
            tracing::error!(meter = %meter.serial, kind = %meter.kind, "provider returned no meter readings");
            return Err(SyncError::NoHistoricalData {
                serial: meter.serial.clone(),
            });
        };

        let cursor = transform::interval_start(first)?;
        tracing::info!(meter = %meter.serial, first_reading = %cursor, "provider reports first reading");

        let seed = if chain.is_some() {
            None
        } else {
            Some(transform::to_batch(&page.results)?)
        };

        Ok(SyncState::Provisioning { cursor, seed, chain })
    }

    async fn provision(
        &self,
        meter: &MeterDescriptor,
        seed: Option<ReadingBatch>,
        chain: Option<ProcessChain>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let node = self.settings.node.as_str();

        if let Some(seed) = seed {
            tracing::info!(meter = %meter.serial, node, "creating sink input from first reading");
            if !self.sink.bulk_insert(&seed, node, &meter.serial).await? {
                return Err(SyncError::SinkUnavailable(format!(
                    "sink did not accept the first reading for {node}/{}",
                    meter.serial
                )));
            }
            report.seeded = true;
        }

        let chain = match chain {
            Some(chain) => chain,
            None => self.sink.input_process_chain(node, &meter.serial).await?,
        };

        if chain.logs_first() {
            return Ok(());
        }

        tracing::warn!(
            meter = %meter.serial,
            node,
            process_list = %chain,
            "input expected to have logging as first process"
        );
        report.feed_created = self.provision_feed(meter).await?;
        Ok(())
    }

    async fn provision_feed(&self, meter: &MeterDescriptor) -> Result<Option<i64>, SyncError> {
        let node = self.settings.node.as_str();
        let template = &self.settings.feed;
        let feed = FeedSpec {
            tag: template.tag.clone(),
            name: meter.serial.clone(),
            datatype: template.datatype,
            engine: template.engine,
            interval_secs: template.interval_secs,
            unit: meter.unit.clone(),
        };

        let Some(feed_id) = self.sink.create_feed(&feed).await? else {
            tracing::warn!(
                meter = %meter.serial,
                "no feed created; readings will be logged to the input only"
            );
            return Ok(None);
        };

        match self.sink.input_id(node, &meter.serial).await? {
            Lookup::Found(input_id) => {
                let chain = ProcessChain::new(vec![ProcessEntry::log_to_feed(feed_id)]);
                if !self.sink.bind_process_chain(input_id, &chain).await? {
                    tracing::warn!(meter = %meter.serial, input_id, feed_id, "sink did not confirm process list");
                }
            }
            Lookup::NotFound => {
                tracing::warn!(meter = %meter.serial, node, feed_id, "input id not found; feed left unbound");
            }
        }

        Ok(Some(feed_id))
    }

    async fn backfill_page(
        &self,
        meter: &MeterDescriptor,
        cursor: OffsetDateTime,
        last_written: Option<i64>,
        report: &mut SyncReport,
    ) -> Result<SyncState, SyncError> {
        let page = self
            .source
            .list_consumption(meter, cursor, self.settings.page_size)
            .await?;

        let Some(last) = page.results.last() else {
            return Ok(SyncState::Drained);
        };

        let batch = transform::to_batch(&page.results)?;
        if let (Some(previous), Some(first)) = (last_written, batch.first_timestamp()) {
            if first <= previous {
                return Err(SyncError::MalformedResponse(format!(
                    "page starting at {first} overlaps previous batch ending at {previous}"
                )));
            }
        }

        if !self.sink.bulk_insert(&batch, &self.settings.node, &meter.serial).await? {
            return Err(SyncError::SinkUnavailable(format!(
                "failed whilst sending {} readings for {}",
                batch.len(),
                meter.serial
            )));
        }
        report.pages += 1;
        report.readings += batch.len() as u64;

        let next = transform::interval_end(last)?;
        if next <= cursor {
            return Err(SyncError::MalformedResponse(format!(
                "interval_end {next} does not advance past period_from {cursor}"
            )));
        }

        Ok(SyncState::Backfilling {
            cursor: next,
            last_written: batch.last_timestamp(),
        })
    }
}
