//! # Donation Forecast
//!
//! A library for turning a raw, transaction-level donation table into a regular calendar
//! series, a bounded forecast over that series, and a side-by-side comparison of actuals
//! and forecasts.
//!
//! ## Core Concepts
//!
//! - **Raw Records**: One row per donation, with a date, donor, campaign type, region and amount
//! - **Filters**: Set-membership selections per categorical column; an empty set selects everything
//! - **Aggregated Series**: Totals per calendar bucket (day, month, quarter, half-year or year)
//! - **Forecast**: A fitted value and an uncertainty interval for every historical bucket,
//!   followed by `horizon` projected buckets
//! - **Comparison**: Actual and forecast totals joined on a reporting period such as the year
//!
//! Data flows strictly: validate, filter, aggregate, forecast, compare.
//!
//! ## Example
//!
//! ```rust,ignore
//! use donation_forecast::*;
//!
//! let csv = std::fs::read("donations.csv")?;
//! let config = PipelineConfig::default();
//! let filters = FilterSet::new().with_regions(["Kigali"]);
//!
//! let run = process_csv(&csv, &config, &filters)?;
//! for row in run.forecast.projections() {
//!     println!("{} {:.0} [{:.0}, {:.0}]", row.period_start, row.point, row.lower, row.upper);
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod filter;
pub mod forecast;
pub mod ingestion;
pub mod model;
pub mod report;
pub mod schema;
pub mod seasonality;
pub mod utils;

pub use aggregate::{densify, Aggregator, DensePoint, PointOrigin};
pub use cache::{DatasetCache, Fingerprint, TableId};
pub use compare::{compare, compare_by, PeriodGrouping};
pub use config::{ColumnMapping, DateParseMode, PipelineConfig};
pub use error::{PipelineError, Result, SchemaError};
pub use filter::{Dimension, FilterOptions, FilterSet};
pub use forecast::{ForecastAdapter, ForecastRequest, MAX_FORECAST_HORIZON, MIN_FORECAST_PERIODS};
pub use ingestion::{
    normalize_columns, RawTable, RejectReason, RowRejection, SchemaValidator, ValidatedDataset,
};
pub use model::{AdditiveModel, AdditiveModelConfig, ForecastModel, ModelError, ModelInput, ModelPrediction};
pub use report::{projection_table, totals_by, GroupTotal, ProjectionRow, ReportCover, SummaryStats};
pub use schema::*;
pub use seasonality::{SeasonalComponent, SeasonalityOptions, YearlySeasonality};

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything one pipeline run derives from a validated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub filters: FilterSet,
    pub filtered_records: Vec<RawRecord>,
    pub summary: SummaryStats,
    pub series: AggregatedSeries,
    pub forecast: ForecastResult,
    pub comparison: Vec<ComparisonRow>,
}

impl PipelineRun {
    pub fn cover(&self, generated_at: NaiveDateTime) -> ReportCover {
        ReportCover::new(generated_at, self.filters.clone(), self.summary.clone())
    }

    pub fn totals_by(&self, dimension: Dimension) -> Vec<GroupTotal> {
        totals_by(&self.filtered_records, dimension)
    }
}

/// Validate, filter, aggregate, forecast and compare, driven by one [`PipelineConfig`].
///
/// The pipeline holds no data between runs. Each call to [`DonationPipeline::run`] works on
/// its own filtered copy of the records.
#[derive(Debug, Clone)]
pub struct DonationPipeline<M = AdditiveModel> {
    config: PipelineConfig,
    validator: SchemaValidator,
    aggregator: Aggregator,
    adapter: ForecastAdapter<M>,
}

impl DonationPipeline<AdditiveModel> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let model = AdditiveModel::new(config.model.clone())
            .map_err(|e| PipelineError::Config(format!("model: {}", e)))?;
        Self::with_model(config, model)
    }
}

impl<M: ForecastModel> DonationPipeline<M> {
    pub fn with_model(config: PipelineConfig, model: M) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            validator: SchemaValidator::from_config(&config),
            aggregator: Aggregator::new(config.bucket)
                .with_fiscal_year_start(config.fiscal_year_start_month),
            adapter: ForecastAdapter::new(model),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        self.adapter.model()
    }

    pub fn load(&self, table: &RawTable) -> Result<ValidatedDataset> {
        self.validator.validate(table)
    }

    pub fn run(&self, dataset: &ValidatedDataset, filters: &FilterSet) -> Result<PipelineRun> {
        info!(
            "Running donation pipeline on {} records ({} buckets, horizon {})",
            dataset.records.len(),
            self.config.bucket,
            self.config.horizon
        );

        let filtered_records = filter::apply(&dataset.records, filters);
        debug!(
            "Filters kept {} of {} records",
            filtered_records.len(),
            dataset.records.len()
        );
        if filtered_records.is_empty() {
            return Err(PipelineError::EmptyResult {
                total: dataset.records.len(),
            });
        }

        let summary = SummaryStats::from_records(&filtered_records);
        let series = self.aggregator.aggregate(&filtered_records)?;
        let forecast = self
            .adapter
            .forecast(&series, &self.config.forecast_request())?;
        let comparison = compare_by(
            &series,
            &forecast,
            self.config.comparison,
            self.config.fiscal_year_start_month,
        );

        info!(
            "Pipeline run complete: {} buckets of history, {} projected, {} comparison rows",
            forecast.history_len,
            forecast.horizon,
            comparison.len()
        );

        Ok(PipelineRun {
            filters: filters.clone(),
            filtered_records,
            summary,
            series,
            forecast,
            comparison,
        })
    }
}

/// Parses a CSV upload and runs the full pipeline with the built-in model.
pub fn process_csv(bytes: &[u8], config: &PipelineConfig, filters: &FilterSet) -> Result<PipelineRun> {
    let pipeline = DonationPipeline::new(config.clone())?;
    let table = RawTable::from_csv_bytes(bytes)?;
    let dataset = pipeline.load(&table)?;
    pipeline.run(&dataset, filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(date: NaiveDate, donor: &str, region: &str, amount: f64) -> RawRecord {
        RawRecord {
            date,
            donor: donor.to_string(),
            campaign_type: "Appeal".to_string(),
            region: region.to_string(),
            amount,
        }
    }

    fn dataset(records: Vec<RawRecord>) -> ValidatedDataset {
        ValidatedDataset {
            total_rows: records.len(),
            records,
            rejections: Vec::new(),
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            horizon: 3,
            model: AdditiveModelConfig {
                uncertainty_samples: 200,
                ..AdditiveModelConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_run_produces_all_outputs() {
        let mut records = Vec::new();
        for month in 1..=12 {
            records.push(record(d(2023, month, 10), "A", "North", 100.0 + month as f64));
            records.push(record(d(2023, month, 20), "B", "South", 50.0));
        }

        let pipeline = DonationPipeline::new(small_config()).unwrap();
        let run = pipeline.run(&dataset(records), &FilterSet::new()).unwrap();

        assert_eq!(run.summary.record_count, 24);
        assert_eq!(run.series.len(), 12);
        assert_eq!(run.forecast.rows.len(), 15);
        assert_eq!(run.forecast.projections().len(), 3);
        assert!(run
            .forecast
            .rows
            .iter()
            .all(|r| r.lower <= r.point && r.point <= r.upper));

        let keys: Vec<String> = run.comparison.iter().map(|r| r.period_key.to_string()).collect();
        assert_eq!(keys, vec!["2023", "2024"]);
        assert!((run.comparison[0].actual - run.summary.total_amount).abs() < 1e-6);
        assert_eq!(run.comparison[1].actual, 0.0);
    }

    #[test]
    fn test_filters_applied_before_aggregation() {
        let records = vec![
            record(d(2024, 1, 5), "A", "North", 100.0),
            record(d(2024, 2, 5), "A", "North", 120.0),
            record(d(2024, 2, 6), "B", "South", 999.0),
        ];
        let pipeline = DonationPipeline::new(small_config()).unwrap();
        let run = pipeline
            .run(&dataset(records), &FilterSet::new().with_regions(["North"]))
            .unwrap();

        assert_eq!(run.filtered_records.len(), 2);
        assert_eq!(run.series.get(d(2024, 2, 1)), Some(120.0));
        assert_eq!(run.totals_by(Dimension::Donor)[0].key, "A");
        assert!(run.cover(d(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap())
            .to_markdown()
            .contains("- Regions: North"));
    }

    #[test]
    fn test_empty_filter_result_stops_before_forecast() {
        let records = vec![record(d(2024, 1, 5), "A", "North", 100.0)];
        let pipeline = DonationPipeline::new(small_config()).unwrap();
        let err = pipeline
            .run(&dataset(records), &FilterSet::new().with_donors(["Z"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult { total: 1 }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            horizon: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            DonationPipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }
}
