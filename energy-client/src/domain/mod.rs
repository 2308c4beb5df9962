mod energy_reading;
mod rate_interval;
mod time_window;

pub use energy_reading::EnergyReading;
pub use rate_interval::RateInterval;
pub use time_window::{overlaps, TimeWindow};

use time::OffsetDateTime;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("interval end {end} is not after start {start}")]
    EmptyInterval {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error("unit price must be finite, got {0}")]
    NonFinitePrice(f64),
}
