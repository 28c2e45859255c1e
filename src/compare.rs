use crate::schema::{AggregatedSeries, BucketUnit, ComparisonRow, ForecastResult, PeriodKey, SeriesPoint};
use crate::utils::fiscal_year_of;
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reporting period for the comparison table. Variants are declared finest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGrouping {
    Day,
    Month,
    #[schemars(description = "Fiscal quarters, labelled with the fiscal year they belong to.")]
    Quarter,
    HalfYear,
    #[schemars(description = "Fiscal years, labelled by the calendar year in which they end.")]
    Year,
}

impl From<BucketUnit> for PeriodGrouping {
    fn from(unit: BucketUnit) -> Self {
        match unit {
            BucketUnit::Day => PeriodGrouping::Day,
            BucketUnit::Month => PeriodGrouping::Month,
            BucketUnit::Quarter => PeriodGrouping::Quarter,
            BucketUnit::HalfYear => PeriodGrouping::HalfYear,
            BucketUnit::Year => PeriodGrouping::Year,
        }
    }
}

impl PeriodGrouping {
    pub fn key_for(&self, date: NaiveDate, fiscal_year_start_month: u32) -> PeriodKey {
        let fiscal_offset = (date.month() as i32 - fiscal_year_start_month as i32).rem_euclid(12) as u32;
        match self {
            PeriodGrouping::Day => PeriodKey::Day(date),
            PeriodGrouping::Month => PeriodKey::month_of(date),
            PeriodGrouping::Quarter => PeriodKey::Quarter {
                year: fiscal_year_of(date, fiscal_year_start_month),
                quarter: fiscal_offset / 3 + 1,
            },
            PeriodGrouping::HalfYear => PeriodKey::HalfYear {
                year: fiscal_year_of(date, fiscal_year_start_month),
                half: fiscal_offset / 6 + 1,
            },
            PeriodGrouping::Year => PeriodKey::Year(fiscal_year_of(date, fiscal_year_start_month)),
        }
    }

    pub fn coarser(a: PeriodGrouping, b: PeriodGrouping) -> PeriodGrouping {
        a.max(b)
    }
}

/// Full outer join of two series on `key_fn`.
///
/// Values are summed within each key. A key present on only one side gets zero on the
/// other. Rows come back ascending by key.
pub fn compare<K, F>(actual: &[SeriesPoint], forecast: &[SeriesPoint], key_fn: F) -> Vec<ComparisonRow<K>>
where
    K: Ord,
    F: Fn(NaiveDate) -> K,
{
    let mut joined: BTreeMap<K, (f64, f64)> = BTreeMap::new();

    for point in actual {
        joined.entry(key_fn(point.period_start)).or_default().0 += point.total;
    }
    for point in forecast {
        joined.entry(key_fn(point.period_start)).or_default().1 += point.total;
    }

    joined
        .into_iter()
        .map(|(period_key, (actual, forecast))| ComparisonRow {
            period_key,
            actual,
            forecast,
        })
        .collect()
}

/// Compares observed totals with every forecast row (fitted and projected).
///
/// Keys use the coarser of `grouping` and the series bucket, so a quarterly series is
/// never split into months.
pub fn compare_by(
    actual: &AggregatedSeries,
    forecast: &ForecastResult,
    grouping: PeriodGrouping,
    fiscal_year_start_month: u32,
) -> Vec<ComparisonRow> {
    let grouping = PeriodGrouping::coarser(grouping, actual.bucket.into());

    let mut forecast_points = forecast.fitted_series();
    forecast_points.extend(forecast.projected_series());

    let rows = compare(&actual.points, &forecast_points, |date| {
        grouping.key_for(date, fiscal_year_start_month)
    });
    debug!("Built {} comparison rows grouped by {:?}", rows.len(), grouping);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForecastRow, RowOrigin};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn p(date: NaiveDate, total: f64) -> SeriesPoint {
        SeriesPoint {
            period_start: date,
            total,
        }
    }

    #[test]
    fn test_yearly_outer_join() {
        let actual = vec![p(d(2023, 1, 1), 100.0), p(d(2023, 7, 1), 50.0), p(d(2024, 1, 1), 120.0)];
        let forecast = vec![p(d(2024, 1, 1), 130.0), p(d(2025, 1, 1), 140.0)];

        let rows = compare(&actual, &forecast, |date| date.year());
        assert_eq!(
            rows,
            vec![
                ComparisonRow { period_key: 2023, actual: 150.0, forecast: 0.0 },
                ComparisonRow { period_key: 2024, actual: 120.0, forecast: 130.0 },
                ComparisonRow { period_key: 2025, actual: 0.0, forecast: 140.0 },
            ]
        );
        assert_eq!(rows[2].difference(), 140.0);
    }

    #[test]
    fn test_empty_inputs() {
        let rows = compare(&[], &[], |date: NaiveDate| date.year());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_key_for_fiscal_periods() {
        // Fiscal year starting in July
        let date = d(2023, 8, 15);
        assert_eq!(PeriodGrouping::Year.key_for(date, 7), PeriodKey::Year(2024));
        assert_eq!(
            PeriodGrouping::Quarter.key_for(date, 7),
            PeriodKey::Quarter { year: 2024, quarter: 1 }
        );
        assert_eq!(
            PeriodGrouping::HalfYear.key_for(d(2024, 3, 1), 7),
            PeriodKey::HalfYear { year: 2024, half: 2 }
        );
        assert_eq!(
            PeriodGrouping::Quarter.key_for(d(2024, 11, 30), 1),
            PeriodKey::Quarter { year: 2024, quarter: 4 }
        );
        assert_eq!(PeriodGrouping::Quarter.key_for(d(2024, 11, 30), 1).to_string(), "2024-Q4");
    }

    #[test]
    fn test_coarser() {
        assert_eq!(PeriodGrouping::coarser(PeriodGrouping::Month, PeriodGrouping::Year), PeriodGrouping::Year);
        assert_eq!(PeriodGrouping::coarser(PeriodGrouping::Quarter, PeriodGrouping::Day), PeriodGrouping::Quarter);
    }

    #[test]
    fn test_compare_by_uses_coarser_grouping() {
        let actual = AggregatedSeries {
            bucket: BucketUnit::Quarter,
            points: vec![p(d(2024, 1, 1), 10.0), p(d(2024, 4, 1), 20.0)],
        };
        let row = |date, point, origin| ForecastRow {
            period_start: date,
            point,
            lower: point,
            upper: point,
            actual: None,
            origin,
        };
        let forecast = ForecastResult {
            bucket: BucketUnit::Quarter,
            model: "test".to_string(),
            history_len: 2,
            horizon: 1,
            clamped_rows: 0,
            rows: vec![
                row(d(2024, 1, 1), 11.0, RowOrigin::Fitted),
                row(d(2024, 4, 1), 19.0, RowOrigin::Fitted),
                row(d(2024, 7, 1), 25.0, RowOrigin::Projected),
            ],
        };

        let rows = compare_by(&actual, &forecast, PeriodGrouping::Month, 1);
        let keys: Vec<String> = rows.iter().map(|r| r.period_key.to_string()).collect();
        assert_eq!(keys, vec!["2024-Q1", "2024-Q2", "2024-Q3"]);
        assert_eq!(rows[2].actual, 0.0);
        assert_eq!(rows[2].forecast, 25.0);
    }
}
