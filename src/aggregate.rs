use crate::error::Result;
use crate::schema::{AggregatedSeries, BucketUnit, RawRecord, SeriesPoint};
use crate::utils::{bucket_start, bucket_starts_after, bucket_starts_between};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointOrigin {
    /// At least one record fell in this bucket
    Observed,
    /// Gap inside the historical range, filled with zero
    ZeroFilled,
    /// Bucket past the last observation, value is always zero
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensePoint {
    pub period_start: NaiveDate,
    pub value: f64,
    pub origin: PointOrigin,
}

/// Collapses transaction rows into calendar buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    unit: BucketUnit,
    fiscal_year_start_month: u32,
}

impl Aggregator {
    pub fn new(unit: BucketUnit) -> Self {
        Self {
            unit,
            fiscal_year_start_month: 1,
        }
    }

    /// Anchors quarter, half-year and year buckets at `month` instead of January.
    #[must_use]
    pub fn with_fiscal_year_start(mut self, month: u32) -> Self {
        self.fiscal_year_start_month = month;
        self
    }

    pub fn unit(&self) -> BucketUnit {
        self.unit
    }

    pub fn aggregate(&self, records: &[RawRecord]) -> Result<AggregatedSeries> {
        self.aggregate_pairs(records.iter().map(|r| (r.date, r.amount)))
    }

    /// Sums `(date, value)` pairs per bucket. Output is ascending by bucket start and only
    /// holds buckets that received at least one pair.
    pub fn aggregate_pairs<I>(&self, pairs: I) -> Result<AggregatedSeries>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut count = 0usize;

        for (date, value) in pairs {
            let start = bucket_start(date, self.unit, self.fiscal_year_start_month)?;
            *buckets.entry(start).or_default() += value;
            count += 1;
        }

        debug!(
            "Aggregated {} rows into {} {} buckets",
            count,
            buckets.len(),
            self.unit
        );

        Ok(AggregatedSeries {
            bucket: self.unit,
            points: buckets
                .into_iter()
                .map(|(period_start, total)| SeriesPoint { period_start, total })
                .collect(),
        })
    }
}

/// Calendar-aligned aggregation (quarters starting in January).
pub fn aggregate(records: &[RawRecord], unit: BucketUnit) -> Result<AggregatedSeries> {
    Aggregator::new(unit).aggregate(records)
}

/// Expands `series` onto a gap-free grid from its first to its last bucket, then appends
/// `extra_buckets` future buckets. Missing buckets carry zero.
pub fn densify(series: &AggregatedSeries, extra_buckets: usize) -> Result<Vec<DensePoint>> {
    let (first, last) = match (series.first_period(), series.last_period()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(Vec::new()),
    };

    let observed: BTreeMap<NaiveDate, f64> = series
        .points
        .iter()
        .map(|p| (p.period_start, p.total))
        .collect();

    let mut dense: Vec<DensePoint> = bucket_starts_between(first, last, series.bucket)?
        .into_iter()
        .map(|period_start| match observed.get(&period_start) {
            Some(&value) => DensePoint {
                period_start,
                value,
                origin: PointOrigin::Observed,
            },
            None => DensePoint {
                period_start,
                value: 0.0,
                origin: PointOrigin::ZeroFilled,
            },
        })
        .collect();

    dense.extend(
        bucket_starts_after(last, series.bucket, extra_buckets)?
            .into_iter()
            .map(|period_start| DensePoint {
                period_start,
                value: 0.0,
                origin: PointOrigin::Future,
            }),
    );

    Ok(dense)
}
