use meter_client::{ApiError, ConsumptionPage, MeterDescriptor, ProcessChain, ReadingBatch};
use time::OffsetDateTime;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("consumption source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("time-series sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("no historical readings available for meter {serial}")]
    NoHistoricalData { serial: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("meter not found: {0}")]
    MeterNotFound(String),
}

impl SyncError {
    pub fn from_source(err: ApiError) -> Self {
        if err.is_unavailable() {
            SyncError::SourceUnavailable(err.to_string())
        } else {
            SyncError::MalformedResponse(err.to_string())
        }
    }

    pub fn from_sink(err: ApiError) -> Self {
        if err.is_unavailable() {
            SyncError::SinkUnavailable(err.to_string())
        } else {
            SyncError::MalformedResponse(err.to_string())
        }
    }
}

/// Outcome of a lookup that distinguishes absence from failure: the
/// surrounding `Result` carries failures, `NotFound` is a normal answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

/// What the sink knows about one input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    pub last_timestamp: Option<i64>,
    pub process_chain: ProcessChain,
}

/// Parameters of a feed to create in the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSpec {
    pub tag: String,
    pub name: String,
    pub datatype: u32,
    pub engine: u32,
    pub interval_secs: u32,
    pub unit: String,
}

/// Paginated, time-ordered consumption readings for a meter.
#[async_trait::async_trait]
pub trait ConsumptionSource: Send + Sync {
    /// Check that the meter point is known to the provider.
    async fn probe_meter(&self, meter: &MeterDescriptor) -> Result<(), SyncError>;

    /// Up to `page_size` readings, ascending, starting at `period_from`.
    /// An empty page means there is no more data.
    async fn list_consumption(
        &self,
        meter: &MeterDescriptor,
        period_from: OffsetDateTime,
        page_size: u32,
    ) -> Result<ConsumptionPage, SyncError>;
}

/// Destination store keyed by `(node, input name)`.
#[async_trait::async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn input(&self, node: &str, name: &str) -> Result<Lookup<InputState>, SyncError>;

    /// `None` when the input has never been created or has no data.
    async fn input_last_timestamp(&self, node: &str, name: &str) -> Result<Option<i64>, SyncError> {
        Ok(self
            .input(node, name)
            .await?
            .found()
            .and_then(|input| input.last_timestamp))
    }

    /// Process chain of an existing input. Asking for the chain of an input
    /// that does not exist is a configuration inconsistency.
    async fn input_process_chain(&self, node: &str, name: &str) -> Result<ProcessChain, SyncError> {
        match self.input(node, name).await? {
            Lookup::Found(input) => Ok(input.process_chain),
            Lookup::NotFound => Err(SyncError::Configuration(format!(
                "input {node}/{name} does not exist"
            ))),
        }
    }

    async fn input_id(&self, node: &str, name: &str) -> Result<Lookup<i64>, SyncError>;

    /// `Ok(None)` when the sink rejected the feed; callers continue without it.
    async fn create_feed(&self, feed: &FeedSpec) -> Result<Option<i64>, SyncError>;

    async fn bind_process_chain(&self, input_id: i64, chain: &ProcessChain) -> Result<bool, SyncError>;

    /// Write the batch in one remote call. An empty batch is a no-op that
    /// reports `false`.
    async fn bulk_insert(&self, batch: &ReadingBatch, node: &str, name: &str) -> Result<bool, SyncError>;
}
