use crate::pipeline::{Envelope, PipelineError, Transform};
use energy_client::domain::EnergyReading;
use time::macros::datetime;

/// Pure validation of an `EnergyReading` record.
///
/// Rules:
/// - channel must be non-negative.
/// - energy_total_wh must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
///
/// Counter resets are legitimate readings and pass; the reconciliation engine
/// discards the affected segment instead.
pub fn validate_energy_reading(
    env: Envelope<EnergyReading>,
) -> Result<Envelope<EnergyReading>, PipelineError> {
    let r = &env.payload;

    if r.channel < 0 {
        return Err(PipelineError::Rejected(format!(
            "channel must be non-negative, got {}",
            r.channel
        )));
    }

    if !r.energy_total_wh.is_finite() || r.energy_total_wh < 0.0 {
        return Err(PipelineError::Rejected(format!(
            "energy_total_wh must be a non-negative number, got {}",
            r.energy_total_wh
        )));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Rejected("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct EnergyReadingValidation;

#[async_trait::async_trait]
impl Transform<EnergyReading> for EnergyReadingValidation {
    async fn apply(
        &self,
        input: Envelope<EnergyReading>,
    ) -> Result<Envelope<EnergyReading>, PipelineError> {
        let channel = input.payload.channel;
        validate_energy_reading(input).inspect_err(|e| {
            tracing::debug!(channel, error = %e, "energy reading failed validation");
            metrics::counter!("validation_energy_reading_rejected_total").increment(1);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(channel: i32, ts: time::OffsetDateTime, wh: f64) -> Envelope<EnergyReading> {
        Envelope::now(EnergyReading::counter(channel, ts, wh))
    }

    #[test]
    fn accepts_valid_reading() {
        let res = validate_energy_reading(reading(0, datetime!(2025-01-01 00:00:00 UTC), 1234.5));
        assert!(res.is_ok());
    }

    #[test]
    fn accepts_counter_at_zero() {
        let res = validate_energy_reading(reading(1, datetime!(2025-01-01 00:00:00 UTC), 0.0));
        assert!(res.is_ok());
    }

    #[test]
    fn rejects_negative_channel() {
        let res = validate_energy_reading(reading(-1, datetime!(2025-01-01 00:00:00 UTC), 10.0));
        assert!(matches!(res, Err(PipelineError::Rejected(_))));
    }

    #[test]
    fn rejects_negative_or_nan_energy() {
        let ts = datetime!(2025-01-01 00:00:00 UTC);
        assert!(matches!(
            validate_energy_reading(reading(0, ts, -0.1)),
            Err(PipelineError::Rejected(_))
        ));
        assert!(matches!(
            validate_energy_reading(reading(0, ts, f64::NAN)),
            Err(PipelineError::Rejected(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_ts() {
        let res = validate_energy_reading(reading(0, datetime!(1800-01-01 00:00:00 UTC), 1.0));
        assert!(matches!(res, Err(PipelineError::Rejected(_))));
    }
}
