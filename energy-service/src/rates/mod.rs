//! Tariff rate loading.
//!
//! Rate records arrive as loosely-typed JSON pages chained by a `next` link.
//! [`RateLoader`] walks the chain lazily, normalizes every record into a
//! [`RateInterval`] and drops the ones that do not describe a usable
//! half-open interval. A failed page fails the whole load.

pub mod octopus;

use std::time::Duration;

use energy_client::domain::{RateInterval, TimeWindow};
use futures::{stream, Stream, TryStreamExt};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub use octopus::OctopusRateClient;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RateError {
    #[error("rate source unavailable: {0}")]
    RateSourceUnavailable(String),
    #[error("invalid rate window: {0}")]
    InvalidWindow(String),
}

/// A rate record as the source sent it. Fields of the wrong JSON type read
/// as absent, leaving [`normalize_rate`] to drop the record.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct RawRate {
    #[serde(default, deserialize_with = "lenient")]
    pub value_inc_vat: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub valid_from: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub valid_to: Option<String>,
}

/// One page of a rate listing. A page without a `results` array is not a
/// rate page; individual records in it that are not objects become empty
/// records.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct RatePage {
    #[serde(deserialize_with = "lenient_records")]
    pub results: Vec<RawRate>,
    #[serde(default)]
    pub next: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<RawRate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap_or_default())
        .collect())
}

/// Position in a paginated rate listing.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCursor {
    First(TimeWindow),
    Next(String),
}

#[async_trait::async_trait]
pub trait RatePageFetcher: Send + Sync {
    async fn fetch(&self, cursor: &PageCursor) -> Result<RatePage, RateError>;
}

fn parse_instant(s: Option<&str>) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s?.trim(), &Rfc3339).ok()
}

/// Converts a raw record into a rate interval, or `None` if it is malformed.
pub fn normalize_rate(raw: &RawRate) -> Option<RateInterval> {
    let valid_from = parse_instant(raw.valid_from.as_deref())?;
    let valid_to = parse_instant(raw.valid_to.as_deref())?;
    let unit_price = raw.value_inc_vat?;

    RateInterval::new(valid_from, valid_to, unit_price).ok()
}

pub struct RateLoader<F> {
    fetcher: F,
    page_timeout: Duration,
    max_pages: usize,
}

impl<F: RatePageFetcher> RateLoader<F> {
    pub fn new(fetcher: F, page_timeout: Duration, max_pages: usize) -> Self {
        Self {
            fetcher,
            page_timeout,
            max_pages: max_pages.max(1),
        }
    }

    /// Lazily fetches pages for `window`, following `next` links until exhausted.
    ///
    /// Each fetch is bounded by the page timeout and the walk by `max_pages`.
    pub fn pages(&self, window: TimeWindow) -> impl Stream<Item = Result<RatePage, RateError>> + Send + '_ {
        let start = (Some(PageCursor::First(window)), 0usize);

        stream::try_unfold(start, move |(cursor, fetched)| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            if fetched >= self.max_pages {
                return Err(RateError::RateSourceUnavailable(format!(
                    "pagination did not terminate within {} pages",
                    self.max_pages
                )));
            }

            let page = tokio::time::timeout(self.page_timeout, self.fetcher.fetch(&cursor))
                .await
                .map_err(|_| {
                    RateError::RateSourceUnavailable(format!(
                        "page {} timed out after {:?}",
                        fetched + 1,
                        self.page_timeout
                    ))
                })??;
            metrics::counter!("rate_pages_fetched_total").increment(1);

            let next = page
                .next
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| PageCursor::Next(url.to_string()));
            Ok(Some((page, (next, fetched + 1))))
        })
    }

    /// All rate intervals overlapping `window`, sorted ascending by `valid_from`.
    pub async fn load(&self, window: TimeWindow) -> Result<Vec<RateInterval>, RateError> {
        if window.end <= window.start {
            return Err(RateError::InvalidWindow(format!(
                "end {} is not after start {}",
                window.end, window.start
            )));
        }

        let (mut intervals, dropped) = self
            .pages(window)
            .try_fold((Vec::new(), 0usize), |(mut acc, mut dropped), page| async move {
                for raw in &page.results {
                    match normalize_rate(raw) {
                        Some(rate) => acc.push(rate),
                        None => dropped += 1,
                    }
                }
                Ok::<_, RateError>((acc, dropped))
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, "rate load failed");
                metrics::counter!("rate_source_failures_total").increment(1);
            })?;

        if dropped > 0 {
            tracing::debug!(dropped, "dropped malformed rate records");
            metrics::counter!("rate_records_dropped_total").increment(dropped as u64);
        }

        intervals.retain(|rate| rate.overlaps(&window));
        intervals.sort_by_key(|rate| rate.valid_from);

        tracing::debug!(
            intervals = intervals.len(),
            start = %window.start,
            end = %window.end,
            "loaded rate intervals"
        );
        Ok(intervals)
    }
}
