//! Tabular outputs of a pipeline run: summary figures, per-dimension totals, CSV exports
//! and the report cover text.

use crate::error::Result;
use crate::filter::{Dimension, FilterSet};
use crate::schema::{AggregatedSeries, BucketUnit, ComparisonRow, ForecastResult, RawRecord, RowOrigin};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_amount: f64,
    pub record_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl SummaryStats {
    pub fn from_records(records: &[RawRecord]) -> Self {
        Self {
            total_amount: records.iter().map(|r| r.amount).sum(),
            record_count: records.len(),
            first_date: records.iter().map(|r| r.date).min(),
            last_date: records.iter().map(|r| r.date).max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
    pub count: usize,
}

/// Sum of amounts per distinct value of `dimension`, largest total first.
/// Equal totals are ordered by key.
pub fn totals_by(records: &[RawRecord], dimension: Dimension) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(dimension.value_of(record)).or_default();
        entry.0 += record.amount;
        entry.1 += 1;
    }

    let mut totals: Vec<GroupTotal> = groups
        .into_iter()
        .map(|(key, (total, count))| GroupTotal {
            key: key.to_string(),
            total,
            count,
        })
        .collect();
    totals.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
    totals
}

pub fn write_series_csv<W: Write>(writer: W, series: &AggregatedSeries) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["period_start", "total"])?;
    for point in &series.points {
        wtr.write_record([point.period_start.to_string(), point.total.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_forecast_csv<W: Write>(writer: W, forecast: &ForecastResult) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["period_start", "forecast", "lower", "upper", "actual", "origin"])?;
    for row in &forecast.rows {
        let origin = match row.origin {
            RowOrigin::Fitted => "fitted",
            RowOrigin::Projected => "projected",
        };
        wtr.write_record([
            row.period_start.to_string(),
            row.point.to_string(),
            row.lower.to_string(),
            row.upper.to_string(),
            row.actual.map(|a| a.to_string()).unwrap_or_default(),
            origin.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_comparison_csv<W: Write, K: Display>(writer: W, rows: &[ComparisonRow<K>]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["period", "actual", "forecast", "difference"])?;
    for row in rows {
        wtr.write_record([
            row.period_key.to_string(),
            row.actual.to_string(),
            row.forecast.to_string(),
            row.difference().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One line of the "Projected Values" table: formatted for display, not for re-import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub date: String,
    pub forecast: String,
    pub lower_bound: String,
    pub upper_bound: String,
}

/// Projected buckets only, dated `%Y-%m` (`%Y-%m-%d` for daily series) with values
/// rounded and grouped by [`format_thousands`].
pub fn projection_table(forecast: &ForecastResult) -> Vec<ProjectionRow> {
    let date_format = match forecast.bucket {
        BucketUnit::Day => "%Y-%m-%d",
        _ => "%Y-%m",
    };
    forecast
        .projections()
        .iter()
        .map(|row| ProjectionRow {
            date: row.period_start.format(date_format).to_string(),
            forecast: format_thousands(row.point),
            lower_bound: format_thousands(row.lower),
            upper_bound: format_thousands(row.upper),
        })
        .collect()
}

pub fn write_projection_csv<W: Write>(writer: W, forecast: &ForecastResult) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Date", "Forecast", "Lower Bound", "Upper Bound"])?;
    for row in projection_table(forecast) {
        wtr.write_record([row.date, row.forecast, row.lower_bound, row.upper_bound])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn series_csv_string(series: &AggregatedSeries) -> Result<String> {
    let mut buffer = Vec::new();
    write_series_csv(&mut buffer, series)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn forecast_csv_string(forecast: &ForecastResult) -> Result<String> {
    let mut buffer = Vec::new();
    write_forecast_csv(&mut buffer, forecast)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn projection_csv_string(forecast: &ForecastResult) -> Result<String> {
    let mut buffer = Vec::new();
    write_projection_csv(&mut buffer, forecast)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn comparison_csv_string<K: Display>(rows: &[ComparisonRow<K>]) -> Result<String> {
    let mut buffer = Vec::new();
    write_comparison_csv(&mut buffer, rows)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Rounds to a whole number and groups digits in threes: `1234567.8` becomes `1,234,568`.
pub fn format_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (idx, ch) in rounded.chars().enumerate() {
        if idx > 0 && (rounded.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 && rounded != "0" {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Front page of the downloadable report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCover {
    pub generated_at: NaiveDateTime,
    pub filters: FilterSet,
    pub summary: SummaryStats,
}

impl ReportCover {
    pub fn new(generated_at: NaiveDateTime, filters: FilterSet, summary: SummaryStats) -> Self {
        Self {
            generated_at,
            filters,
            summary,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Donation Forecast Report\n\n");
        output.push_str(&format!(
            "**Run on:** {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M")
        ));

        output.push_str("## Filters Applied\n\n");
        for (label, dimension) in [
            ("Donors", Dimension::Donor),
            ("Campaigns", Dimension::CampaignType),
            ("Regions", Dimension::Region),
        ] {
            let selection = self.filters.selection(dimension);
            let values = if selection.is_empty() {
                "All".to_string()
            } else {
                selection.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            };
            output.push_str(&format!("- {}: {}\n", label, values));
        }
        output.push('\n');

        output.push_str("## Summary\n\n");
        output.push_str(&format!("- Total records: {}\n", self.summary.record_count));
        output.push_str(&format!(
            "- Total donated: {}\n",
            format_thousands(self.summary.total_amount)
        ));
        if let (Some(first), Some(last)) = (self.summary.first_date, self.summary.last_date) {
            output.push_str(&format!("- Period: {} to {}\n", first, last));
        }

        output
    }
}
