use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const SECONDS_PER_HOUR: i64 = 3600;

/// Half-open UTC window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
}

impl TimeRange {
    pub fn new(from: OffsetDateTime, to: OffsetDateTime) -> Result<Self> {
        let from = from.to_offset(UtcOffset::UTC);
        let to = to.to_offset(UtcOffset::UTC);
        if from >= to {
            bail!("time range is empty: from {from} is not before to {to}");
        }
        Ok(Self { from, to })
    }

    /// Parse two RFC 3339 timestamps.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let from = OffsetDateTime::parse(from, &Rfc3339)?;
        let to = OffsetDateTime::parse(to, &Rfc3339)?;
        Self::new(from, to)
    }

    /// Round `from` down and `to` up to whole hours.
    pub fn expand_to_hours(&self) -> Result<Self> {
        let from = self.from.unix_timestamp();
        let to = self.to.unix_timestamp();
        let floor = from - from.rem_euclid(SECONDS_PER_HOUR);
        let rem = to.rem_euclid(SECONDS_PER_HOUR);
        let ceil = if rem == 0 { to } else { to - rem + SECONDS_PER_HOUR };
        Self::new(
            OffsetDateTime::from_unix_timestamp(floor)?,
            OffsetDateTime::from_unix_timestamp(ceil)?,
        )
    }

    /// Split into consecutive one-hour windows. The range is expanded to
    /// whole hours first, so the last window never overhangs.
    pub fn split_hourly(&self) -> Result<Vec<TimeRange>> {
        let expanded = self.expand_to_hours()?;
        let mut windows = Vec::new();
        let mut start = expanded.from.unix_timestamp();
        let end = expanded.to.unix_timestamp();
        while start < end {
            windows.push(Self::new(
                OffsetDateTime::from_unix_timestamp(start)?,
                OffsetDateTime::from_unix_timestamp(start + SECONDS_PER_HOUR)?,
            )?);
            start += SECONDS_PER_HOUR;
        }
        Ok(windows)
    }

    pub fn from_millis(&self) -> i64 {
        (self.from.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn to_millis(&self) -> i64 {
        (self.to.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn contains_millis(&self, millis: i64) -> bool {
        millis >= self.from_millis() && millis < self.to_millis()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.to - self.from).whole_minutes()
    }

    /// Compact label used in artifact file names: `202401311300-202401311400`.
    pub fn file_label(&self) -> String {
        let fmt = format_description!("[year][month][day][hour][minute]");
        format!(
            "{}-{}",
            self.from.format(&fmt).unwrap_or_default(),
            self.to.format(&fmt).unwrap_or_default()
        )
    }
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Render epoch milliseconds as RFC 3339; empty when out of range.
pub fn millis_to_rfc3339(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}
