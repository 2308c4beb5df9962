//! Time-weighted reconciliation of metered consumption against tariff rates.
//!
//! Consumption is derived by differencing consecutive counter readings of a
//! channel. Each resulting segment is clipped to the query window and its
//! energy is spread uniformly over its duration, so a segment crossing a
//! tariff boundary is priced proportionally on each side.
//!
//! Everything here is pure and synchronous. Totals are accumulated unrounded
//! and rounded once when the [`WindowResult`] is produced.

use energy_client::domain::{EnergyReading, RateInterval, TimeWindow};
use time::{Duration, OffsetDateTime};

const KWH_DP: i32 = 3;
const PRICE_DP: i32 = 3;
const COST_DP: i32 = 2;
const RATIO_DP: i32 = 4;

const WH_PER_KWH: f64 = 1000.0;
const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

/// Energy drawn between two consecutive readings of one channel, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionSegment {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub delta_wh: f64,
}

impl ConsumptionSegment {
    /// The segment between `prev` and `curr`, or `None` if the pair is
    /// unusable (counter reset, zero delta, non-increasing timestamps).
    pub fn between(prev: &EnergyReading, curr: &EnergyReading) -> Option<Self> {
        let delta_wh = curr.energy_total_wh - prev.energy_total_wh;
        let valid = curr.ts > prev.ts && delta_wh.is_finite() && delta_wh > 0.0;

        valid.then_some(Self {
            start: prev.ts,
            end: curr.ts,
            delta_wh,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The part of this segment inside `window`, carrying energy in
    /// proportion to the time kept.
    pub fn clip_to(&self, window: &TimeWindow) -> Option<ClippedSegment> {
        let span = window.clip(self.start, self.end)?;
        let kwh = (self.delta_wh / WH_PER_KWH) * fraction(span.duration(), self.duration());

        (kwh.is_finite() && kwh > 0.0).then_some(ClippedSegment { span, kwh })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedSegment {
    pub span: TimeWindow,
    pub kwh: f64,
}

impl ClippedSegment {
    /// Energy falling under `rate`, zero when they do not overlap.
    pub fn energy_under(&self, rate: &RateInterval) -> f64 {
        match self.span.clip(rate.valid_from, rate.valid_to) {
            Some(overlap) => self.kwh * fraction(overlap.duration(), self.span.duration()),
            None => 0.0,
        }
    }
}

fn fraction(part: Duration, whole: Duration) -> f64 {
    part.as_seconds_f64() / whole.as_seconds_f64()
}

/// Valid segments of one channel's ordered readings, plus the number of
/// consecutive pairs that were discarded.
pub fn segments(readings: &[EnergyReading]) -> (Vec<ConsumptionSegment>, usize) {
    let mut valid = Vec::with_capacity(readings.len().saturating_sub(1));
    let mut rejected = 0;

    for pair in readings.windows(2) {
        match ConsumptionSegment::between(&pair[0], &pair[1]) {
            Some(segment) => valid.push(segment),
            None => rejected += 1,
        }
    }
    (valid, rejected)
}

/// Rates overlapping `window`, sorted, with overlaps removed.
///
/// Each instant is priced by the latest-starting interval that contains it;
/// of two intervals starting together the longer one wins. An interval
/// interrupted by a shorter one nested inside it resumes once that one ends,
/// so an instant covered by any rate stays priced, and only once.
pub fn resolve_overlaps(rates: &[RateInterval], window: &TimeWindow) -> Vec<RateInterval> {
    let mut sorted: Vec<RateInterval> = rates.iter().filter(|r| r.overlaps(window)).copied().collect();
    sorted.sort_by_key(|r| (r.valid_from, r.valid_to));

    let mut edges: Vec<OffsetDateTime> = sorted.iter().flat_map(|r| [r.valid_from, r.valid_to]).collect();
    edges.sort();
    edges.dedup();

    // (index into `sorted`, resolved piece)
    let mut pieces: Vec<(usize, RateInterval)> = Vec::with_capacity(sorted.len());
    for edge in edges.windows(2) {
        let (from, to) = (edge[0], edge[1]);
        let started = sorted.partition_point(|r| r.valid_from <= from);
        let Some(winner) = sorted[..started].iter().rposition(|r| r.valid_to > from) else {
            continue;
        };

        match pieces.last_mut() {
            Some((last, piece)) if *last == winner && piece.valid_to == from => piece.valid_to = to,
            _ => pieces.push((
                winner,
                RateInterval {
                    valid_from: from,
                    valid_to: to,
                    ..sorted[winner]
                },
            )),
        }
    }
    pieces.into_iter().map(|(_, piece)| piece).collect()
}

/// Unrounded running totals for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowTotals {
    pub kwh_measured: f64,
    pub kwh_priced: f64,
    /// Minor currency units (pence).
    pub cost_minor: f64,
    pub segments_used: usize,
    pub segments_rejected: usize,
}

impl WindowTotals {
    fn add(&mut self, clipped: &ClippedSegment, rates: &[RateInterval]) {
        self.kwh_measured += clipped.kwh;
        self.segments_used += 1;

        // Rates are sorted and disjoint; only those starting before the
        // segment ends can overlap it.
        let candidates = rates.partition_point(|r| r.valid_from < clipped.span.end);
        for rate in &rates[..candidates] {
            let kwh = clipped.energy_under(rate);
            if kwh > 0.0 {
                self.kwh_priced += kwh;
                self.cost_minor += kwh * rate.unit_price;
            }
        }
    }

    pub fn finish(&self) -> WindowResult {
        let avg = (self.kwh_priced > 0.0).then(|| self.cost_minor / self.kwh_priced);
        let coverage = if self.kwh_measured > 0.0 {
            self.kwh_priced / self.kwh_measured
        } else {
            0.0
        };

        WindowResult {
            avg_paid_ppkwh: avg.map(|v| round_dp(v, PRICE_DP)),
            total_kwh_priced: round_dp(self.kwh_priced, KWH_DP),
            total_kwh_measured: round_dp(self.kwh_measured, KWH_DP),
            total_cost_gbp: round_dp(self.cost_minor / MINOR_UNITS_PER_MAJOR, COST_DP),
            coverage_ratio: round_dp(coverage, RATIO_DP),
        }
    }
}

/// Accumulates every channel's consumption inside `window`.
pub fn accumulate_window(
    rates: &[RateInterval],
    readings_by_channel: &[Vec<EnergyReading>],
    window: &TimeWindow,
) -> WindowTotals {
    let rates = resolve_overlaps(rates, window);
    let mut totals = WindowTotals::default();

    for readings in readings_by_channel {
        let (segments, rejected) = segments(readings);
        totals.segments_rejected += rejected;

        for clipped in segments.iter().filter_map(|s| s.clip_to(window)) {
            totals.add(&clipped, &rates);
        }
    }
    totals
}

pub fn compute_window(
    rates: &[RateInterval],
    readings_by_channel: &[Vec<EnergyReading>],
    window: &TimeWindow,
) -> WindowResult {
    let totals = accumulate_window(rates, readings_by_channel, window);
    if totals.segments_rejected > 0 {
        tracing::debug!(
            rejected = totals.segments_rejected,
            used = totals.segments_used,
            "discarded invalid consumption segments"
        );
        metrics::counter!("reconcile_segments_rejected_total").increment(totals.segments_rejected as u64);
    }
    totals.finish()
}

/// Reconciled figures for one window, rounded for presentation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WindowResult {
    /// Weighted average unit price paid, pence per kWh. `None` when nothing was priced.
    pub avg_paid_ppkwh: Option<f64>,
    pub total_kwh_priced: f64,
    pub total_kwh_measured: f64,
    pub total_cost_gbp: f64,
    pub coverage_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    NoUsage,
    Unpriced,
    Partial,
    Reconciled,
}

impl WindowResult {
    pub fn status(&self) -> WindowStatus {
        if self.total_kwh_measured <= 0.0 {
            WindowStatus::NoUsage
        } else if self.total_kwh_priced <= 0.0 {
            WindowStatus::Unpriced
        } else if self.coverage_ratio < 1.0 {
            WindowStatus::Partial
        } else {
            WindowStatus::Reconciled
        }
    }
}

pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    let rounded = (value * factor).round() / factor;
    // Collapse -0.0 so it serializes as 0.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
