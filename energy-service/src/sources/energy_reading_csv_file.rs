use std::{fs::File, io::Read, path::PathBuf};

use csv::StringRecord;
use energy_client::domain::EnergyReading;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// CSV backfill source for `EnergyReading`.
///
/// Expected header columns (by name):
/// - ts (RFC3339 timestamp)
/// - channel
/// - energy_total_wh (cumulative counter, Wh)
/// - device_id (optional)
/// - power_w (optional)
/// - voltage (optional)
///
/// Rows that fail to parse are rejected individually; the rest of the file
/// still loads.
pub struct EnergyReadingCsvFileSource {
    path: PathBuf,
}

impl EnergyReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        trimmed.parse().ok()
    }
}

fn parse_optional_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn record_to_energy_reading(
    record: &StringRecord,
    headers: &StringRecord,
) -> Result<EnergyReading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Rejected(format!("missing column '{name}' in CSV record")))
    };

    let ts_str = get("ts")?;
    let ts = OffsetDateTime::parse(ts_str.trim(), &Rfc3339)
        .map_err(|e| PipelineError::Rejected(format!("invalid ts '{ts_str}': {e}")))?;

    let channel_str = get("channel")?;
    let channel: i32 = channel_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Rejected(format!("invalid channel '{channel_str}': {e}")))?;

    let wh_str = get("energy_total_wh")?;
    let energy_total_wh: f64 = wh_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Rejected(format!("invalid energy_total_wh '{wh_str}': {e}")))?;

    Ok(EnergyReading {
        channel,
        ts,
        energy_total_wh,
        device_id: get("device_id").ok().and_then(parse_optional_string),
        power_w: get("power_w").ok().and_then(parse_optional_f64),
        voltage: get("voltage").ok().and_then(parse_optional_f64),
    })
}

/// Parses every row of `reader`, yielding one result per record.
fn read_records<R: Read>(reader: R) -> Result<Vec<Result<EnergyReading, PipelineError>>, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
        .clone();

    let mut out = Vec::new();
    for result in rdr.records() {
        let record =
            result.map_err(|e| PipelineError::Source(format!("failed to read CSV record: {e}")))?;
        let parsed = record_to_energy_reading(&record, &headers);
        if parsed.is_err() {
            metrics::counter!("energy_reading_csv_parse_errors_total").increment(1);
        }
        out.push(parsed);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl Source<EnergyReading> for EnergyReadingCsvFileSource {
    async fn stream(&self) -> RecordStream<EnergyReading> {
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let rows = tokio::task::spawn_blocking(move || {
                let file = File::open(&path)
                    .map_err(|e| PipelineError::Source(format!("failed to open CSV file {}: {e}", path.display())))?;
                read_records(file)
            })
            .await
            .map_err(|e| PipelineError::Source(format!("CSV reader task failed: {e}")))??;

            tracing::info!(rows = rows.len(), "read energy reading backfill file");

            for row in rows {
                match row {
                    Ok(reading) => yield Envelope::now(reading),
                    Err(PipelineError::Rejected(reason)) => {
                        tracing::warn!(%reason, "skipping unparseable CSV row");
                    }
                    Err(e) => Err::<(), PipelineError>(e)?,
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_required_and_optional_columns() {
        let csv = "ts,channel,energy_total_wh,device_id,power_w,voltage\n\
                   2025-12-20T01:00:00Z,1,460.31,em-1,3000,230\n\
                   2025-12-20T02:00:00Z,1,748.83,,,\n";

        let rows = read_records(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.ts, datetime!(2025-12-20 01:00:00 UTC));
        assert_eq!(first.channel, 1);
        assert_eq!(first.device_id.as_deref(), Some("em-1"));
        assert_eq!(first.power_w, Some(3000.0));

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.energy_total_wh, 748.83);
        assert_eq!(second.device_id, None);
        assert_eq!(second.voltage, None);
    }

    #[test]
    fn bad_rows_are_rejected_individually() {
        let csv = "ts,channel,energy_total_wh\n\
                   not-a-time,0,1.0\n\
                   2025-12-20T02:00:00Z,0,2.0\n";

        let rows = read_records(csv.as_bytes()).unwrap();

        assert!(matches!(rows[0], Err(PipelineError::Rejected(_))));
        assert!(rows[1].is_ok());
    }
}
