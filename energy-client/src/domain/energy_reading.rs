use time::OffsetDateTime;

/// One cumulative energy counter sample for a metered channel.
///
/// `energy_total_wh` only ever grows, except when the meter hardware resets
/// its counter; consumers derive usage by differencing consecutive samples.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnergyReading {
    pub channel: i32,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    pub energy_total_wh: f64,
    pub device_id: Option<String>,
    pub power_w: Option<f64>,
    pub voltage: Option<f64>,
}

impl EnergyReading {
    /// A bare counter sample without the optional telemetry columns.
    pub fn counter(channel: i32, ts: OffsetDateTime, energy_total_wh: f64) -> Self {
        Self {
            channel,
            ts,
            energy_total_wh,
            device_id: None,
            power_w: None,
            voltage: None,
        }
    }
}
