use time::{Duration, OffsetDateTime};

use super::DomainError;

/// Open-interval overlap test: `[a, b)` overlaps `[c, d)` iff `a < d && b > c`.
pub fn overlaps(a: OffsetDateTime, b: OffsetDateTime, c: OffsetDateTime, d: OffsetDateTime) -> bool {
    a < d && b > c
}

/// Half-open query window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeWindow {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub end: OffsetDateTime,
}

impl TimeWindow {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Intersection with `[start, end)`, or `None` when it is empty.
    pub fn clip(&self, start: OffsetDateTime, end: OffsetDateTime) -> Option<TimeWindow> {
        let clipped_start = start.max(self.start);
        let clipped_end = end.min(self.end);
        (clipped_end > clipped_start).then_some(TimeWindow {
            start: clipped_start,
            end: clipped_end,
        })
    }
}
