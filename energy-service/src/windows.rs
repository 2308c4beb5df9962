//! Calendar-day report windows in a fixed civil time zone.
//!
//! A day runs from one civil midnight to the next, so it is 23 or 25 hours
//! long across daylight-saving transitions.

use energy_client::domain::{DomainError, TimeWindow};
use jiff::{civil::Date, tz::TimeZone, Span, Timestamp};
use time::OffsetDateTime;

#[derive(thiserror::Error, Debug)]
pub enum WindowError {
    #[error("calendar error: {0}")]
    Calendar(#[from] jiff::Error),
    #[error("instant out of range: {0}")]
    OutOfRange(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn to_timestamp(t: OffsetDateTime) -> Result<Timestamp, WindowError> {
    Ok(Timestamp::from_nanosecond(t.unix_timestamp_nanos())?)
}

fn to_offset_date_time(t: Timestamp) -> Result<OffsetDateTime, WindowError> {
    OffsetDateTime::from_unix_timestamp_nanos(t.as_nanosecond())
        .map_err(|e| WindowError::OutOfRange(e.to_string()))
}

fn start_of_day(tz: &TimeZone, date: Date) -> Result<OffsetDateTime, WindowError> {
    let zoned = date.to_zoned(tz.clone())?;
    to_offset_date_time(zoned.timestamp())
}

/// The civil date of `now` in `tz`.
pub fn civil_date(tz: &TimeZone, now: OffsetDateTime) -> Result<Date, WindowError> {
    Ok(to_timestamp(now)?.to_zoned(tz.clone()).date())
}

/// The whole civil day `offset` days from `today` (negative is the past).
pub fn calendar_day(tz: &TimeZone, today: Date, offset: i64) -> Result<TimeWindow, WindowError> {
    let day = today.checked_add(Span::new().try_days(offset)?)?;
    let start = start_of_day(tz, day)?;
    let end = start_of_day(tz, day.tomorrow()?)?;
    Ok(TimeWindow::new(start, end)?)
}

/// The complete days reported on, all ending at the start of today.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportWindows {
    pub yesterday: TimeWindow,
    pub last7d: TimeWindow,
    pub last30d: TimeWindow,
}

impl ReportWindows {
    pub fn ending_before_today(now: OffsetDateTime, tz: &TimeZone) -> Result<Self, WindowError> {
        let today = civil_date(tz, now)?;
        let yesterday = calendar_day(tz, today, -1)?;
        let week_start = calendar_day(tz, today, -7)?.start;
        let month_start = calendar_day(tz, today, -30)?.start;

        Ok(Self {
            yesterday,
            last7d: TimeWindow::new(week_start, yesterday.end)?,
            last30d: TimeWindow::new(month_start, yesterday.end)?,
        })
    }

    /// Smallest window covering all three.
    pub fn span(&self) -> TimeWindow {
        TimeWindow {
            start: self.last30d.start.min(self.last7d.start).min(self.yesterday.start),
            end: self.last30d.end.max(self.last7d.end).max(self.yesterday.end),
        }
    }
}
