use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, UtcOffset,
};

/// `period_from` layout expected by the consumption endpoint. The offset is
/// always written out (`+00:00`) so the API never falls back to local time.
const PERIOD_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
);

/// Parse an offset-carrying ISO-8601 timestamp and normalise it to UTC.
pub fn parse_utc(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let ts = OffsetDateTime::parse(raw, &Rfc3339)?;
    Ok(ts.to_offset(UtcOffset::UTC))
}

/// Parse an offset-carrying ISO-8601 timestamp to UTC epoch seconds.
pub fn parse_unix_seconds(raw: &str) -> Result<i64, time::error::Parse> {
    parse_utc(raw).map(|ts| ts.unix_timestamp())
}

pub fn from_unix_seconds(seconds: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp(seconds)
}

pub fn format_period(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC).format(PERIOD_FORMAT)
}
