use std::time::Duration;

use energy_client::domain::EnergyReading;
use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink};

const INSERT_PREFIX: &str =
    "INSERT INTO energy_readings (ts, channel, energy_total_wh, device_id, power_w, voltage) ";

/// Batched pgwire writer for the `energy_readings` table.
pub struct EnergyReadingSink {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

/// Multi-row insert for one batch of readings.
fn insert_readings(batch: &[Envelope<EnergyReading>]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(INSERT_PREFIX);
    builder.push_values(batch.iter().map(|env| &env.payload), |mut row, r| {
        row.push_bind(r.ts)
            .push_bind(r.channel)
            .push_bind(r.energy_total_wh)
            .push_bind(r.device_id.as_deref())
            .push_bind(r.power_w)
            .push_bind(r.voltage);
    });
    builder
}

/// Delay before retry number `attempt` (1-based); grows linearly.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

impl EnergyReadingSink {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn write(&self, batch: &[Envelope<EnergyReading>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(self.retry_backoff, attempt)).await;
            }
            match insert_readings(batch).build().execute(&self.pool).await {
                Ok(result) => {
                    metrics::counter!("energy_readings_ingested_total").increment(result.rows_affected());
                    let queued = batch[0].received_at.elapsed().unwrap_or_default();
                    tracing::debug!(
                        rows = result.rows_affected(),
                        attempt,
                        queued_ms = queued.as_millis() as u64,
                        "energy readings written"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, rows = batch.len(), "energy readings insert failed");
                    last_error = Some(e);
                }
            }
        }

        metrics::counter!("energy_readings_sink_errors_total").increment(1);
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(PipelineError::Sink(format!(
            "gave up on {} readings after {} retries: {reason}",
            batch.len(),
            self.max_retries
        )))
    }
}

#[async_trait::async_trait]
impl Sink<EnergyReading> for EnergyReadingSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<EnergyReading>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut pending: Vec<Envelope<EnergyReading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            match item {
                Ok(env) => pending.push(env),
                Err(e @ PipelineError::Source(_)) => {
                    // Keep what already arrived before stopping.
                    self.write(&pending).await?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring failed upstream record");
                    continue;
                }
            }

            if pending.len() == self.batch_size {
                self.write(&pending).await?;
                pending.clear();
            }
        }

        self.write(&pending).await
    }
}
