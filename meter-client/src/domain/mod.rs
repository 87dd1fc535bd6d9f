pub mod meter;
pub mod process_chain;
pub mod reading;
pub mod timestamps;

pub use meter::{MeterDescriptor, MeterKind};
pub use process_chain::{ProcessChain, ProcessChainParseError, ProcessEntry, LOG_TO_FEED};
pub use reading::{BatchOrderError, ConsumptionPage, RawReading, Reading, ReadingBatch};
