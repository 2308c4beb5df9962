use anyhow::Result;
use energy_client::domain::EnergyReading;
use energy_service::{
    api,
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    rates::{OctopusRateClient, RateLoader},
    readings::PgReadingsStore,
    sinks::EnergyReadingSink,
    sources::HttpReadingsSource,
    stats::EnergyStatsService,
    transform,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    // Energy stats API
    let rate_client = OctopusRateClient::new(&cfg.tariff)?;
    tracing::info!(tariff = %rate_client.tariff_code(), "using tariff");
    let loader = RateLoader::new(rate_client, cfg.tariff.page_timeout(), cfg.tariff.max_pages);
    let stats = EnergyStatsService::new(
        loader,
        PgReadingsStore::new(pool.clone()),
        cfg.stats.channels.clone(),
        &cfg.stats.timezone,
        cfg.stats.request_timeout(),
    )?;
    let app = api::router(Arc::new(stats));
    let listener = tokio::net::TcpListener::bind(&cfg.stats.http_bind_addr).await?;
    tracing::info!(addr = %cfg.stats.http_bind_addr, "serving energy stats");

    // Energy readings ingestion pipeline
    let er_cfg = &cfg.energy_readings;
    let source = HttpReadingsSource::new(&er_cfg.source.http_bind_addr, er_cfg.source.channel_capacity).await?;
    let sink = EnergyReadingSink::new(
        pool,
        er_cfg.sink.batch_size,
        er_cfg.sink.max_retries,
        er_cfg.sink.retry_backoff(),
    );
    let pipeline: Pipeline<_, EnergyReading, _> = Pipeline {
        name: er_cfg.name.clone(),
        source,
        transforms: vec![Arc::new(transform::EnergyReadingValidation)],
        sink,
    };

    // Serve the API and run ingestion concurrently
    tokio::try_join!(
        async { pipeline.run().await.map_err(anyhow::Error::from) },
        async {
            axum::serve(listener, app.into_make_service())
                .await
                .map_err(anyhow::Error::from)
        },
    )?;

    Ok(())
}
