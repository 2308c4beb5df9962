use std::time::Duration;

use energy_client::domain::EnergyReading;
use futures::future::try_join_all;
use jiff::tz::TimeZone;
use time::OffsetDateTime;

use crate::{
    rates::{RateError, RateLoader, RatePageFetcher},
    readings::{load_channel_readings, ReadingsError, ReadingsStore},
    reconcile::{compute_window, WindowResult},
    windows::{ReportWindows, WindowError},
};

pub const SCOPE: &str = "all_heaters_combined";
pub const METHOD: &str = "kwh_weighted_avg_price_paid";

#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error(transparent)]
    Rates(#[from] RateError),
    #[error(transparent)]
    Readings(#[from] ReadingsError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("energy stats not computed within {0:?}")]
    DeadlineExceeded(Duration),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EnergyStatsReport {
    pub scope: &'static str,
    pub method: &'static str,
    pub windows: String,
    pub yesterday: WindowResult,
    pub last7d: WindowResult,
    pub last30d: WindowResult,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Label describing how report windows are cut.
fn windows_label(tz_name: &str) -> String {
    match tz_name {
        "Europe/London" => "uk_calendar_complete_days".to_string(),
        other => format!(
            "{}_calendar_complete_days",
            other.to_ascii_lowercase().replace('/', "_")
        ),
    }
}

/// Combined consumption and average price paid over recent whole days.
pub struct EnergyStatsService<F, S> {
    loader: RateLoader<F>,
    store: S,
    channels: Vec<i32>,
    tz: TimeZone,
    windows_label: String,
    request_timeout: Duration,
}

impl<F, S> EnergyStatsService<F, S>
where
    F: RatePageFetcher,
    S: ReadingsStore,
{
    pub fn new(
        loader: RateLoader<F>,
        store: S,
        channels: Vec<i32>,
        tz_name: &str,
        request_timeout: Duration,
    ) -> Result<Self, WindowError> {
        let tz = TimeZone::get(tz_name)?;
        Ok(Self {
            loader,
            store,
            channels,
            tz,
            windows_label: windows_label(tz_name),
            request_timeout,
        })
    }

    pub async fn report(&self, now: OffsetDateTime) -> Result<EnergyStatsReport, StatsError> {
        tokio::time::timeout(self.request_timeout, self.build_report(now))
            .await
            .map_err(|_| StatsError::DeadlineExceeded(self.request_timeout))?
    }

    async fn build_report(&self, now: OffsetDateTime) -> Result<EnergyStatsReport, StatsError> {
        let windows = ReportWindows::ending_before_today(now, &self.tz)?;
        let span = windows.span();

        let rates = async { self.loader.load(span).await.map_err(StatsError::from) };
        let readings = try_join_all(self.channels.iter().map(|&channel| async move {
            load_channel_readings(&self.store, channel, &span)
                .await
                .map_err(StatsError::from)
        }));
        let (rates, readings_by_channel): (_, Vec<Vec<EnergyReading>>) =
            futures::try_join!(rates, readings)?;

        tracing::info!(
            rate_intervals = rates.len(),
            readings = readings_by_channel.iter().map(Vec::len).sum::<usize>(),
            start = %span.start,
            end = %span.end,
            "computing energy stats"
        );

        let report = EnergyStatsReport {
            scope: SCOPE,
            method: METHOD,
            windows: self.windows_label.clone(),
            yesterday: compute_window(&rates, &readings_by_channel, &windows.yesterday),
            last7d: compute_window(&rates, &readings_by_channel, &windows.last7d),
            last30d: compute_window(&rates, &readings_by_channel, &windows.last30d),
            generated_at: now,
        };
        tracing::debug!(
            yesterday = ?report.yesterday.status(),
            last7d = ?report.last7d.status(),
            last30d = ?report.last30d.status(),
            "energy stats computed"
        );
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedRates;
    use super::*;
    use crate::readings::memory::InMemoryReadingsStore;
    use crate::rates::PageCursor;
    use crate::reconcile::WindowStatus;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-01-10 09:00:00 UTC);

    fn service<F: RatePageFetcher>(
        rates: F,
        store: InMemoryReadingsStore,
    ) -> EnergyStatsService<F, InMemoryReadingsStore> {
        EnergyStatsService::new(
            RateLoader::new(rates, Duration::from_secs(1), 10),
            store,
            vec![0, 1],
            "Europe/London",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn readings() -> InMemoryReadingsStore {
        InMemoryReadingsStore::new(vec![
            // Yesterday (2025-01-09), channel 0: 1 kWh over one hour.
            EnergyReading::counter(0, datetime!(2025-01-09 10:00:00 UTC), 5000.0),
            EnergyReading::counter(0, datetime!(2025-01-09 11:00:00 UTC), 6000.0),
            // Three days ago, channel 1: 2 kWh.
            EnergyReading::counter(1, datetime!(2025-01-07 02:00:00 UTC), 100.0),
            EnergyReading::counter(1, datetime!(2025-01-07 03:00:00 UTC), 2100.0),
            // Today: outside every window.
            EnergyReading::counter(0, datetime!(2025-01-10 08:00:00 UTC), 9000.0),
        ])
    }

    #[tokio::test]
    async fn combines_channels_per_window() {
        let rates = FixedRates::new(&[
            ("2025-01-09T10:00:00Z", "2025-01-09T11:00:00Z", 20.0),
            ("2025-01-07T02:00:00Z", "2025-01-07T03:00:00Z", 10.0),
        ]);

        let report = service(rates, readings()).report(NOW).await.unwrap();

        assert_eq!(report.scope, "all_heaters_combined");
        assert_eq!(report.windows, "uk_calendar_complete_days");
        assert_eq!(report.generated_at, NOW);

        assert_eq!(report.yesterday.total_kwh_measured, 1.0);
        assert_eq!(report.yesterday.avg_paid_ppkwh, Some(20.0));
        assert_eq!(report.yesterday.total_cost_gbp, 0.2);

        assert_eq!(report.last7d.total_kwh_measured, 3.0);
        assert_eq!(report.last7d.total_cost_gbp, 0.4);
        assert_eq!(report.last7d.avg_paid_ppkwh, Some(13.333));
        assert_eq!(report.last30d, report.last7d);
    }

    #[tokio::test]
    async fn missing_rates_are_unpriced_not_an_error() {
        let report = service(FixedRates::new(&[]), readings()).report(NOW).await.unwrap();

        assert_eq!(report.yesterday.status(), WindowStatus::Unpriced);
        assert_eq!(report.yesterday.avg_paid_ppkwh, None);
        assert_eq!(report.yesterday.coverage_ratio, 0.0);
    }

    #[tokio::test]
    async fn rate_source_failure_fails_report() {
        let rates = FixedRates(Err(RateError::RateSourceUnavailable("502".to_string())));

        let res = service(rates, readings()).report(NOW).await;

        assert!(matches!(res, Err(StatsError::Rates(RateError::RateSourceUnavailable(_)))));
    }

    #[tokio::test]
    async fn store_failure_fails_report() {
        let res = service(FixedRates::new(&[]), InMemoryReadingsStore::failing())
            .report(NOW)
            .await;

        assert!(matches!(res, Err(StatsError::Readings(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_hits_deadline() {
        struct Hanging;

        #[async_trait::async_trait]
        impl RatePageFetcher for Hanging {
            async fn fetch(&self, _cursor: &PageCursor) -> Result<crate::rates::RatePage, RateError> {
                std::future::pending().await
            }
        }

        let svc = EnergyStatsService::new(
            RateLoader::new(Hanging, Duration::from_secs(600), 10),
            readings(),
            vec![0],
            "Europe/London",
            Duration::from_secs(5),
        )
        .unwrap();

        let res = svc.report(NOW).await;

        assert!(matches!(res, Err(StatsError::DeadlineExceeded(_))));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let res = EnergyStatsService::new(
            RateLoader::new(FixedRates::new(&[]), Duration::from_secs(1), 1),
            readings(),
            vec![0],
            "Mars/Olympus_Mons",
            Duration::from_secs(5),
        );

        assert!(matches!(res, Err(WindowError::Calendar(_))));
    }

    #[test]
    fn label_follows_zone() {
        assert_eq!(windows_label("Europe/London"), "uk_calendar_complete_days");
        assert_eq!(windows_label("Europe/Dublin"), "europe_dublin_calendar_complete_days");
    }
}
