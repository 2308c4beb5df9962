use time::OffsetDateTime;

use super::{overlaps, DomainError, TimeWindow};

/// A tariff period `[valid_from, valid_to)` with a single unit price.
///
/// `unit_price` is in minor currency units per kWh and may be negative.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateInterval {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub valid_from: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub valid_to: OffsetDateTime,
    pub unit_price: f64,
}

impl RateInterval {
    pub fn new(
        valid_from: OffsetDateTime,
        valid_to: OffsetDateTime,
        unit_price: f64,
    ) -> Result<Self, DomainError> {
        if valid_to <= valid_from {
            return Err(DomainError::EmptyInterval {
                start: valid_from,
                end: valid_to,
            });
        }
        if !unit_price.is_finite() {
            return Err(DomainError::NonFinitePrice(unit_price));
        }
        Ok(Self {
            valid_from,
            valid_to,
            unit_price,
        })
    }

    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.valid_from <= t && t < self.valid_to
    }

    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        overlaps(self.valid_from, self.valid_to, window.start, window.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn rejects_empty_interval() {
        let t = datetime!(2025-01-01 00:00:00 UTC);
        assert!(matches!(
            RateInterval::new(t, t, 10.0),
            Err(DomainError::EmptyInterval { .. })
        ));
    }

    #[test]
    fn contains_is_half_open() {
        let rate = RateInterval::new(
            datetime!(2025-01-01 00:00:00 UTC),
            datetime!(2025-01-01 00:30:00 UTC),
            -2.5,
        )
        .unwrap();

        assert!(rate.contains(datetime!(2025-01-01 00:00:00 UTC)));
        assert!(rate.contains(datetime!(2025-01-01 00:29:59 UTC)));
        assert!(!rate.contains(datetime!(2025-01-01 00:30:00 UTC)));
    }

    #[test]
    fn touching_window_does_not_overlap() {
        let rate = RateInterval::new(
            datetime!(2025-01-01 00:00:00 UTC),
            datetime!(2025-01-01 00:30:00 UTC),
            15.0,
        )
        .unwrap();
        let after = TimeWindow::new(
            datetime!(2025-01-01 00:30:00 UTC),
            datetime!(2025-01-01 01:00:00 UTC),
        )
        .unwrap();

        assert!(!rate.overlaps(&after));
    }
}
