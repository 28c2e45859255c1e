use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One donation transaction after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub date: NaiveDate,
    pub donor: String,
    pub campaign_type: String,
    pub region: String,
    /// Finite and non-negative, currency-denominated.
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BucketUnit {
    #[schemars(description = "One bucket per calendar day.")]
    Day,

    #[schemars(description = "One bucket per calendar month, keyed by the first day of the month.")]
    Month,

    #[schemars(
        description = "Three-month blocks anchored at the fiscal year start month (Jan/Apr/Jul/Oct for calendar years)."
    )]
    Quarter,

    #[schemars(
        description = "Six-month blocks anchored at the fiscal year start month (Jan/Jul for calendar years)."
    )]
    HalfYear,

    #[schemars(description = "Twelve-month blocks starting at the fiscal year start month.")]
    Year,
}

impl BucketUnit {
    /// Length of the bucket in months, `None` for daily buckets.
    pub fn months(&self) -> Option<u32> {
        match self {
            BucketUnit::Day => None,
            BucketUnit::Month => Some(1),
            BucketUnit::Quarter => Some(3),
            BucketUnit::HalfYear => Some(6),
            BucketUnit::Year => Some(12),
        }
    }
}

impl fmt::Display for BucketUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BucketUnit::Day => "day",
            BucketUnit::Month => "month",
            BucketUnit::Quarter => "quarter",
            BucketUnit::HalfYear => "half_year",
            BucketUnit::Year => "year",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period_start: NaiveDate,
    pub total: f64,
}

/// Summed totals per calendar bucket. Only buckets holding at least one record appear,
/// in strictly increasing `period_start` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    pub bucket: BucketUnit,
    pub points: Vec<SeriesPoint>,
}

impl AggregatedSeries {
    pub fn empty(bucket: BucketUnit) -> Self {
        Self {
            bucket,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.total).sum()
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.period_start)
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.period_start)
    }

    pub fn get(&self, period_start: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&period_start, |p| p.period_start)
            .ok()
            .map(|idx| self.points[idx].total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOrigin {
    /// In-sample fit over the historical grid
    Fitted,
    /// Out-of-sample projection past the last observed bucket
    Projected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub period_start: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    /// Observed (zero-filled) total for historical rows, `None` for projections
    pub actual: Option<f64>,
    pub origin: RowOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub bucket: BucketUnit,
    pub model: String,
    /// Number of buckets in the dense historical grid
    pub history_len: usize,
    pub horizon: usize,
    /// Rows whose interval had to be widened to contain the point estimate
    pub clamped_rows: usize,
    pub rows: Vec<ForecastRow>,
}

impl ForecastResult {
    pub fn fitted(&self) -> &[ForecastRow] {
        &self.rows[..self.history_len.min(self.rows.len())]
    }

    pub fn projections(&self) -> &[ForecastRow] {
        &self.rows[self.history_len.min(self.rows.len())..]
    }

    pub fn fitted_series(&self) -> Vec<SeriesPoint> {
        to_points(self.fitted())
    }

    pub fn projected_series(&self) -> Vec<SeriesPoint> {
        to_points(self.projections())
    }
}

fn to_points(rows: &[ForecastRow]) -> Vec<SeriesPoint> {
    rows.iter()
        .map(|r| SeriesPoint {
            period_start: r.period_start,
            total: r.point,
        })
        .collect()
}

/// Reporting key for the comparison table.
///
/// Variants are only compared against keys produced by the same grouping, so the
/// derived ordering (variant first, then fields) is chronological within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodKey {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    HalfYear { year: i32, half: u32 },
    Year(i32),
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PeriodKey::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            PeriodKey::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            PeriodKey::HalfYear { year, half } => write!(f, "{:04}-H{}", year, half),
            PeriodKey::Year(year) => write!(f, "{:04}", year),
        }
    }
}

impl PeriodKey {
    pub fn month_of(date: NaiveDate) -> Self {
        PeriodKey::Month {
            year: date.year(),
            month: date.month(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow<K = PeriodKey> {
    pub period_key: K,
    pub actual: f64,
    pub forecast: f64,
}

impl<K> ComparisonRow<K> {
    /// Forecast minus actual.
    pub fn difference(&self) -> f64 {
        self.forecast - self.actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_bucket_unit_serialization() {
        let json = serde_json::to_string(&BucketUnit::HalfYear).unwrap();
        assert_eq!(json, "\"half_year\"");

        let parsed: BucketUnit = serde_json::from_str("\"quarter\"").unwrap();
        assert_eq!(parsed, BucketUnit::Quarter);
    }

    #[test]
    fn test_period_key_display() {
        assert_eq!(PeriodKey::Year(2024).to_string(), "2024");
        assert_eq!(
            PeriodKey::Quarter {
                year: 2024,
                quarter: 3
            }
            .to_string(),
            "2024-Q3"
        );
        assert_eq!(PeriodKey::month_of(d(2024, 2, 10)).to_string(), "2024-02");
        assert_eq!(PeriodKey::Day(d(2024, 2, 10)).to_string(), "2024-02-10");
    }

    #[test]
    fn test_series_lookup() {
        let series = AggregatedSeries {
            bucket: BucketUnit::Month,
            points: vec![
                SeriesPoint {
                    period_start: d(2024, 1, 1),
                    total: 150.0,
                },
                SeriesPoint {
                    period_start: d(2024, 2, 1),
                    total: 200.0,
                },
            ],
        };

        assert_eq!(series.get(d(2024, 2, 1)), Some(200.0));
        assert_eq!(series.get(d(2024, 3, 1)), None);
        assert!((series.total() - 350.0).abs() < 1e-9);
        assert_eq!(series.first_period(), Some(d(2024, 1, 1)));
    }

    #[test]
    fn test_forecast_result_split() {
        let row = |m: u32, origin: RowOrigin| ForecastRow {
            period_start: d(2024, m, 1),
            point: m as f64,
            lower: 0.0,
            upper: 10.0,
            actual: None,
            origin,
        };
        let result = ForecastResult {
            bucket: BucketUnit::Month,
            model: "test".to_string(),
            history_len: 2,
            horizon: 1,
            clamped_rows: 0,
            rows: vec![
                row(1, RowOrigin::Fitted),
                row(2, RowOrigin::Fitted),
                row(3, RowOrigin::Projected),
            ],
        };

        assert_eq!(result.fitted().len(), 2);
        assert_eq!(result.projections().len(), 1);
        assert_eq!(result.projected_series()[0].period_start, d(2024, 3, 1));
    }
}
