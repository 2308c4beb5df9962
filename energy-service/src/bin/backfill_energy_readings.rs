use anyhow::{bail, Result};
use energy_client::domain::EnergyReading;
use energy_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::EnergyReadingSink,
    sources::EnergyReadingCsvFileSource,
    transform,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_energy_readings <csv_file_path>");
    }
    let file_path = &args[1];

    // ENERGY_CONFIG can point at a backfill-specific file.
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let er_cfg = &cfg.energy_readings;
    let sink = EnergyReadingSink::new(
        pool,
        er_cfg.sink.batch_size,
        er_cfg.sink.max_retries,
        er_cfg.sink.retry_backoff(),
    );

    let pipeline: Pipeline<_, EnergyReading, _> = Pipeline {
        name: "energy_readings_backfill".to_string(),
        source: EnergyReadingCsvFileSource::new(file_path),
        transforms: vec![Arc::new(transform::EnergyReadingValidation)],
        sink,
    };

    pipeline.run().await?;
    tracing::info!(file = %file_path, "backfill complete");

    Ok(())
}
