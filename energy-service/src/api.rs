use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;

use crate::{
    rates::RatePageFetcher,
    readings::ReadingsStore,
    stats::EnergyStatsService,
};

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

/// Read-only HTTP surface for computed energy stats.
pub fn router<F, S>(service: Arc<EnergyStatsService<F, S>>) -> Router
where
    F: RatePageFetcher + 'static,
    S: ReadingsStore + 'static,
{
    Router::new()
        .route("/api/energy-stats", get(energy_stats::<F, S>))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(service)
}

async fn energy_stats<F, S>(State(service): State<Arc<EnergyStatsService<F, S>>>) -> Response
where
    F: RatePageFetcher + 'static,
    S: ReadingsStore + 'static,
{
    match service.report(OffsetDateTime::now_utc()).await {
        Ok(report) => {
            metrics::counter!("energy_stats_requests_total", "outcome" => "ok").increment(1);
            Json(report).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to compute energy stats");
            metrics::counter!("energy_stats_requests_total", "outcome" => "unavailable").increment(1);
            let body = ErrorBody {
                error: "Failed to compute energy stats",
                detail: e.to_string(),
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
