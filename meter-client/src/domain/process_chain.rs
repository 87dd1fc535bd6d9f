use std::{fmt, str::FromStr};

/// emoncms process id of "log to feed".
pub const LOG_TO_FEED: u32 = 1;

/// Newer emoncms builds report processes by name instead of numeric id.
const NAMED_PROCESSES: &[(&str, u32)] = &[("process__log_to_feed", LOG_TO_FEED)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub process_type: u32,
    pub feed_id: i64,
}

impl ProcessEntry {
    pub fn log_to_feed(feed_id: i64) -> Self {
        Self {
            process_type: LOG_TO_FEED,
            feed_id,
        }
    }

    pub fn is_log_to_feed(&self) -> bool {
        self.process_type == LOG_TO_FEED
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid process list entry {entry:?}")]
pub struct ProcessChainParseError {
    pub entry: String,
}

/// Ordered processes attached to an input, as stored in `processList`
/// (`"1:42,3:7"`). An empty string is an empty chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessChain(Vec<ProcessEntry>);

impl ProcessChain {
    pub fn new(entries: Vec<ProcessEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[ProcessEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&ProcessEntry> {
        self.0.first()
    }

    /// True when the first process logs the input into a feed.
    pub fn logs_first(&self) -> bool {
        self.first().is_some_and(ProcessEntry::is_log_to_feed)
    }
}

fn parse_entry(raw: &str) -> Result<ProcessEntry, ProcessChainParseError> {
    let err = || ProcessChainParseError {
        entry: raw.to_string(),
    };
    let (kind, arg) = raw.trim().split_once(':').ok_or_else(err)?;
    let process_type = match kind.parse::<u32>() {
        Ok(id) => id,
        Err(_) => NAMED_PROCESSES
            .iter()
            .find(|(name, _)| *name == kind)
            .map(|(_, id)| *id)
            .ok_or_else(err)?,
    };
    let feed_id = arg.parse::<i64>().map_err(|_| err())?;

    Ok(ProcessEntry {
        process_type,
        feed_id,
    })
}

impl FromStr for ProcessChain {
    type Err = ProcessChainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        s.split(',')
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for ProcessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", entry.process_type, entry.feed_id)?;
        }
        Ok(())
    }
}
