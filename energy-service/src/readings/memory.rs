use std::sync::atomic::{AtomicUsize, Ordering};

use energy_client::domain::EnergyReading;
use time::OffsetDateTime;

use super::{ReadingsError, ReadingsStore};

/// Vec-backed store with the same range semantics as the SQL queries.
pub(crate) struct InMemoryReadingsStore {
    readings: Vec<EnergyReading>,
    fail: bool,
    page_calls: AtomicUsize,
}

impl InMemoryReadingsStore {
    pub(crate) fn new(mut readings: Vec<EnergyReading>) -> Self {
        readings.sort_by_key(|r| r.ts);
        Self {
            readings,
            fail: false,
            page_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            readings: Vec::new(),
            fail: true,
            page_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ReadingsError> {
        if self.fail {
            return Err(ReadingsError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingsStore for InMemoryReadingsStore {
    async fn latest_before(
        &self,
        channel: i32,
        before: OffsetDateTime,
    ) -> Result<Option<EnergyReading>, ReadingsError> {
        self.check()?;
        Ok(self
            .readings
            .iter()
            .rev()
            .find(|r| r.channel == channel && r.ts < before)
            .cloned())
    }

    async fn readings_page(
        &self,
        channel: i32,
        start: OffsetDateTime,
        end: OffsetDateTime,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EnergyReading>, ReadingsError> {
        self.check()?;
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .readings
            .iter()
            .filter(|r| r.channel == channel && r.ts >= start && r.ts <= end)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
