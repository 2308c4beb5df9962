use energy_client::{
    db::{self, READINGS_PAGE_SIZE},
    domain::{EnergyReading, TimeWindow},
};
use sqlx::PgPool;
use time::OffsetDateTime;

#[cfg(test)]
pub(crate) mod memory;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReadingsError {
    #[error("readings store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Range access to stored counter readings.
#[async_trait::async_trait]
pub trait ReadingsStore: Send + Sync {
    /// Latest reading strictly before `before`.
    async fn latest_before(
        &self,
        channel: i32,
        before: OffsetDateTime,
    ) -> Result<Option<EnergyReading>, ReadingsError>;

    /// Readings in the closed range `[start, end]`, ascending, at most `limit` rows after `offset`.
    async fn readings_page(
        &self,
        channel: i32,
        start: OffsetDateTime,
        end: OffsetDateTime,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EnergyReading>, ReadingsError>;
}

/// The anchor reading before `window` (if any) followed by every reading
/// inside it, paging through the store until a short page comes back.
pub async fn load_channel_readings<S: ReadingsStore + ?Sized>(
    store: &S,
    channel: i32,
    window: &TimeWindow,
) -> Result<Vec<EnergyReading>, ReadingsError> {
    let anchor = store.latest_before(channel, window.start).await?;
    let mut readings: Vec<EnergyReading> = anchor.into_iter().collect();

    let mut offset = 0;
    loop {
        let page = store
            .readings_page(channel, window.start, window.end, offset, READINGS_PAGE_SIZE)
            .await?;
        let fetched = page.len() as i64;
        readings.extend(page);

        if fetched < READINGS_PAGE_SIZE {
            break;
        }
        offset += READINGS_PAGE_SIZE;
    }

    tracing::debug!(channel, readings = readings.len(), "loaded channel readings");
    Ok(readings)
}

pub struct PgReadingsStore {
    pool: PgPool,
}

impl PgReadingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: anyhow::Error) -> ReadingsError {
    metrics::counter!("readings_store_errors_total").increment(1);
    ReadingsError::StoreUnavailable(e.to_string())
}

#[async_trait::async_trait]
impl ReadingsStore for PgReadingsStore {
    async fn latest_before(
        &self,
        channel: i32,
        before: OffsetDateTime,
    ) -> Result<Option<EnergyReading>, ReadingsError> {
        db::latest_before(&self.pool, channel, before)
            .await
            .map_err(unavailable)
    }

    async fn readings_page(
        &self,
        channel: i32,
        start: OffsetDateTime,
        end: OffsetDateTime,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EnergyReading>, ReadingsError> {
        db::readings_page(&self.pool, channel, start, end, offset, limit)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryReadingsStore;
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn window() -> TimeWindow {
        TimeWindow::new(
            datetime!(2025-01-01 00:00:00 UTC),
            datetime!(2025-01-02 00:00:00 UTC),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn prepends_latest_reading_before_window() {
        let store = InMemoryReadingsStore::new(vec![
            EnergyReading::counter(0, datetime!(2024-12-31 23:40:00 UTC), 90.0),
            EnergyReading::counter(0, datetime!(2024-12-31 23:50:00 UTC), 100.0),
            EnergyReading::counter(1, datetime!(2024-12-31 23:55:00 UTC), 5.0),
            EnergyReading::counter(0, datetime!(2025-01-01 00:10:00 UTC), 150.0),
            EnergyReading::counter(0, datetime!(2025-01-02 00:00:00 UTC), 300.0),
            EnergyReading::counter(0, datetime!(2025-01-02 00:10:00 UTC), 400.0),
        ]);

        let readings = load_channel_readings(&store, 0, &window()).await.unwrap();

        let wh: Vec<f64> = readings.iter().map(|r| r.energy_total_wh).collect();
        assert_eq!(wh, vec![100.0, 150.0, 300.0]);
    }

    #[tokio::test]
    async fn no_anchor_when_channel_starts_inside_window() {
        let store = InMemoryReadingsStore::new(vec![EnergyReading::counter(
            1,
            datetime!(2025-01-01 06:00:00 UTC),
            10.0,
        )]);

        let readings = load_channel_readings(&store, 1, &window()).await.unwrap();

        assert_eq!(readings.len(), 1);
    }

    #[tokio::test]
    async fn pages_through_more_than_one_page() {
        let start = datetime!(2025-01-01 00:00:00 UTC);
        let total = READINGS_PAGE_SIZE as usize * 2 + 7;
        let readings: Vec<_> = (0..total)
            .map(|i| EnergyReading::counter(0, start + Duration::seconds(i as i64 * 30), i as f64))
            .collect();
        let store = InMemoryReadingsStore::new(readings);

        let loaded = load_channel_readings(&store, 0, &window()).await.unwrap();

        assert_eq!(loaded.len(), total);
        assert!(loaded.windows(2).all(|p| p[0].ts < p[1].ts));
        assert_eq!(store.page_calls(), 3);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = InMemoryReadingsStore::failing();

        let res = load_channel_readings(&store, 0, &window()).await;

        assert!(matches!(res, Err(ReadingsError::StoreUnavailable(_))));
    }
}
