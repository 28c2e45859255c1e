use crate::aggregate::{densify, DensePoint, PointOrigin};
use crate::error::{PipelineError, Result};
use crate::model::{ForecastModel, ModelInput, ModelPrediction};
use crate::schema::{AggregatedSeries, BucketUnit, ForecastResult, ForecastRow, RowOrigin};
use crate::seasonality::{resolve_components, validate_components, SeasonalityOptions};
use crate::utils::days_between;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Minimum number of distinct aggregation periods a forecast can be fitted on.
pub const MIN_FORECAST_PERIODS: usize = 2;

/// Largest horizon a request may ask for, in buckets.
pub const MAX_FORECAST_HORIZON: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// Number of future buckets to project
    pub horizon: usize,
    pub bucket: BucketUnit,
    pub seasonality: SeasonalityOptions,
    /// Probability mass of the uncertainty interval, in (0, 1)
    pub interval_width: f64,
}

impl ForecastRequest {
    pub fn new(horizon: usize, bucket: BucketUnit) -> Self {
        Self {
            horizon,
            bucket,
            seasonality: SeasonalityOptions::default(),
            interval_width: 0.8,
        }
    }

    #[must_use]
    pub fn with_seasonality(mut self, seasonality: SeasonalityOptions) -> Self {
        self.seasonality = seasonality;
        self
    }

    #[must_use]
    pub fn with_interval_width(mut self, interval_width: f64) -> Self {
        self.interval_width = interval_width;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(PipelineError::InvalidRequest(
                "horizon must be greater than zero".to_string(),
            ));
        }
        if self.horizon > MAX_FORECAST_HORIZON {
            return Err(PipelineError::InvalidRequest(format!(
                "horizon must be at most {} buckets, got {}",
                MAX_FORECAST_HORIZON, self.horizon
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(PipelineError::InvalidRequest(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        validate_components(&self.seasonality.components)
    }
}

/// Prepares an aggregated series for a [`ForecastModel`] and normalizes what comes back.
#[derive(Debug, Clone)]
pub struct ForecastAdapter<M> {
    model: M,
}

impl<M: ForecastModel> ForecastAdapter<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Fits the model on `series` and projects `request.horizon` buckets ahead.
    ///
    /// The result holds one row per bucket of the dense historical grid followed by one
    /// row per future bucket, and every row satisfies `lower <= point <= upper`.
    pub fn forecast(&self, series: &AggregatedSeries, request: &ForecastRequest) -> Result<ForecastResult> {
        request.validate()?;

        if series.bucket != request.bucket {
            return Err(PipelineError::InvalidRequest(format!(
                "series is aggregated by {} but the forecast was requested by {}",
                series.bucket, request.bucket
            )));
        }

        if let Some(pair) = series
            .points
            .windows(2)
            .find(|pair| pair[0].period_start >= pair[1].period_start)
        {
            return Err(PipelineError::InvalidRequest(format!(
                "series periods must be strictly increasing, found {} followed by {}",
                pair[0].period_start, pair[1].period_start
            )));
        }
        if series.len() < MIN_FORECAST_PERIODS {
            return Err(PipelineError::InsufficientData {
                required: MIN_FORECAST_PERIODS,
                found: series.len(),
            });
        }

        let grid = densify(series, request.horizon)?;
        let (history, future): (Vec<&DensePoint>, Vec<&DensePoint>) = grid
            .iter()
            .partition(|p| p.origin != PointOrigin::Future);
        let zero_filled = history
            .iter()
            .filter(|p| p.origin == PointOrigin::ZeroFilled)
            .count();
        if zero_filled > 0 {
            debug!(
                "Filled {} empty {} buckets with zero before forecasting",
                zero_filled, series.bucket
            );
        }

        let span_days = match (history.first(), history.last()) {
            (Some(first), Some(last)) => days_between(first.period_start, last.period_start),
            _ => 0.0,
        };
        let input = ModelInput {
            history: history.iter().map(|p| (p.period_start, p.value)).collect(),
            timestamps: grid.iter().map(|p| p.period_start).collect(),
            seasonalities: resolve_components(&request.seasonality, span_days, request.bucket),
            interval_width: request.interval_width,
        };

        info!(
            "Forecasting {} {} buckets ahead from {} historical buckets with '{}'",
            request.horizon,
            request.bucket,
            history.len(),
            self.model.name()
        );

        let predictions = self
            .model
            .fit_predict(&input)
            .map_err(|e| self.forecast_error(e.to_string()))?;
        self.check_predictions(&input, &predictions)?;

        let mut clamped_rows = 0;
        let rows: Vec<ForecastRow> = grid
            .iter()
            .zip(&predictions)
            .map(|(slot, prediction)| {
                let (lower, upper, clamped) = clamp_interval(prediction);
                if clamped {
                    clamped_rows += 1;
                }
                let projected = slot.origin == PointOrigin::Future;
                ForecastRow {
                    period_start: slot.period_start,
                    point: prediction.point,
                    lower,
                    upper,
                    actual: (!projected).then_some(slot.value),
                    origin: if projected {
                        RowOrigin::Projected
                    } else {
                        RowOrigin::Fitted
                    },
                }
            })
            .collect();

        if clamped_rows > 0 {
            warn!(
                "Model '{}' returned {} rows with the point estimate outside its interval; bounds were widened",
                self.model.name(),
                clamped_rows
            );
        }

        Ok(ForecastResult {
            bucket: request.bucket,
            model: self.model.name().to_string(),
            history_len: history.len(),
            horizon: future.len(),
            clamped_rows,
            rows,
        })
    }

    fn forecast_error(&self, details: String) -> PipelineError {
        PipelineError::Forecast {
            model: self.model.name().to_string(),
            details,
        }
    }

    fn check_predictions(&self, input: &ModelInput, predictions: &[ModelPrediction]) -> Result<()> {
        if predictions.len() != input.timestamps.len() {
            return Err(self.forecast_error(format!(
                "expected {} predictions, got {}",
                input.timestamps.len(),
                predictions.len()
            )));
        }

        for (expected, prediction) in input.timestamps.iter().zip(predictions) {
            if prediction.date != *expected {
                return Err(self.forecast_error(format!(
                    "prediction for {} returned where {} was expected",
                    prediction.date, expected
                )));
            }
            if !(prediction.point.is_finite() && prediction.lower.is_finite() && prediction.upper.is_finite()) {
                return Err(self.forecast_error(format!(
                    "non-finite prediction at {} (point={}, lower={}, upper={})",
                    prediction.date, prediction.point, prediction.lower, prediction.upper
                )));
            }
        }

        Ok(())
    }
}

/// Returns `(lower, upper, clamped)` with `lower <= point <= upper`.
fn clamp_interval(prediction: &ModelPrediction) -> (f64, f64, bool) {
    let lower = prediction.lower.min(prediction.upper);
    let upper = prediction.lower.max(prediction.upper);
    let clamped_lower = lower.min(prediction.point);
    let clamped_upper = upper.max(prediction.point);
    let clamped = clamped_lower != prediction.lower || clamped_upper != prediction.upper;
    (clamped_lower, clamped_upper, clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdditiveModel, ModelError};
    use crate::schema::SeriesPoint;
    use crate::seasonality::SeasonalComponent;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monthly(points: &[(NaiveDate, f64)]) -> AggregatedSeries {
        AggregatedSeries {
            bucket: BucketUnit::Month,
            points: points
                .iter()
                .map(|&(period_start, total)| SeriesPoint { period_start, total })
                .collect(),
        }
    }

    /// Returns the configured predictions regardless of input.
    #[derive(Debug)]
    struct ScriptedModel {
        predictions: Vec<ModelPrediction>,
    }

    impl ForecastModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fit_predict(&self, _input: &ModelInput) -> std::result::Result<Vec<ModelPrediction>, ModelError> {
            Ok(self.predictions.clone())
        }
    }

    #[derive(Debug)]
    struct FailingModel;

    impl ForecastModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn fit_predict(&self, _input: &ModelInput) -> std::result::Result<Vec<ModelPrediction>, ModelError> {
            Err(ModelError::SingularSystem)
        }
    }

    fn prediction(date: NaiveDate, point: f64, lower: f64, upper: f64) -> ModelPrediction {
        ModelPrediction {
            date,
            point,
            lower,
            upper,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(ForecastRequest::new(0, BucketUnit::Month).validate().is_err());
        assert!(ForecastRequest::new(3, BucketUnit::Month)
            .with_interval_width(1.0)
            .validate()
            .is_err());
        assert!(ForecastRequest::new(3, BucketUnit::Month)
            .with_seasonality(
                SeasonalityOptions::default().with_component(SeasonalComponent::new("bad", -1.0, 2))
            )
            .validate()
            .is_err());
        assert!(ForecastRequest::new(3, BucketUnit::Month).validate().is_ok());
        assert!(ForecastRequest::new(MAX_FORECAST_HORIZON, BucketUnit::Day).validate().is_ok());
    }

    #[test]
    fn test_oversized_horizon_is_an_error() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let series = monthly(&[(d(2024, 1, 1), 1.0), (d(2024, 2, 1), 2.0)]);
        let err = adapter
            .forecast(&series, &ForecastRequest::new(usize::MAX / 2, BucketUnit::Month))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_unordered_periods() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let request = ForecastRequest::new(1, BucketUnit::Month);

        let unsorted = monthly(&[(d(2024, 3, 1), 1.0), (d(2024, 1, 1), 2.0), (d(2024, 2, 1), 3.0)]);
        let err = adapter.forecast(&unsorted, &request).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));

        let repeated = monthly(&[(d(2024, 1, 1), 1.0), (d(2024, 2, 1), 2.0), (d(2024, 1, 1), 3.0)]);
        let err = adapter.forecast(&repeated, &request).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_rejects_empty_and_single_period() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let request = ForecastRequest::new(1, BucketUnit::Month);

        let err = adapter.forecast(&monthly(&[]), &request).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { required: 2, found: 0 }));

        let err = adapter
            .forecast(&monthly(&[(d(2024, 1, 1), 100.0)]), &request)
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient data for forecasting: need ≥2 periods, found 1");
    }

    #[test]
    fn test_rejects_bucket_mismatch() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let series = monthly(&[(d(2024, 1, 1), 1.0), (d(2024, 2, 1), 2.0)]);
        let err = adapter
            .forecast(&series, &ForecastRequest::new(1, BucketUnit::Quarter))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn test_forecast_covers_history_and_horizon() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let series = monthly(&[(d(2024, 1, 1), 150.0), (d(2024, 2, 1), 200.0)]);
        let result = adapter
            .forecast(&series, &ForecastRequest::new(1, BucketUnit::Month))
            .unwrap();

        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.history_len, 2);
        assert_eq!(result.horizon, 1);
        assert_eq!(result.rows[2].period_start, d(2024, 3, 1));
        assert_eq!(result.rows[2].origin, RowOrigin::Projected);
        assert_eq!(result.rows[0].actual, Some(150.0));
        assert_eq!(result.rows[2].actual, None);
        for row in &result.rows {
            assert!(row.lower <= row.point && row.point <= row.upper);
        }
    }

    #[test]
    fn test_gaps_are_zero_filled() {
        let adapter = ForecastAdapter::new(AdditiveModel::default());
        let series = monthly(&[(d(2024, 1, 1), 100.0), (d(2024, 4, 1), 50.0)]);
        let result = adapter
            .forecast(&series, &ForecastRequest::new(2, BucketUnit::Month))
            .unwrap();

        assert_eq!(result.history_len, 4);
        assert_eq!(result.rows.len(), 6);
        assert_eq!(result.rows[1].actual, Some(0.0));
        assert_eq!(result.rows[2].actual, Some(0.0));
        assert_eq!(result.rows[5].period_start, d(2024, 6, 1));
    }

    #[test]
    fn test_clamps_inverted_intervals() {
        let model = ScriptedModel {
            predictions: vec![
                prediction(d(2024, 1, 1), 10.0, 12.0, 15.0),
                prediction(d(2024, 2, 1), 20.0, 25.0, 18.0),
                prediction(d(2024, 3, 1), 30.0, 28.0, 32.0),
            ],
        };
        let adapter = ForecastAdapter::new(model);
        let series = monthly(&[(d(2024, 1, 1), 10.0), (d(2024, 2, 1), 20.0)]);
        let result = adapter
            .forecast(&series, &ForecastRequest::new(1, BucketUnit::Month))
            .unwrap();

        assert_eq!(result.clamped_rows, 2);
        assert_eq!((result.rows[0].lower, result.rows[0].upper), (10.0, 15.0));
        assert_eq!((result.rows[1].lower, result.rows[1].upper), (18.0, 25.0));
        assert_eq!((result.rows[2].lower, result.rows[2].upper), (28.0, 32.0));
    }

    #[test]
    fn test_wraps_model_failures() {
        let adapter = ForecastAdapter::new(FailingModel);
        let series = monthly(&[(d(2024, 1, 1), 10.0), (d(2024, 2, 1), 20.0)]);
        let err = adapter
            .forecast(&series, &ForecastRequest::new(1, BucketUnit::Month))
            .unwrap_err();

        match err {
            PipelineError::Forecast { model, details } => {
                assert_eq!(model, "failing");
                assert!(details.contains("singular"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_misaligned_model_output() {
        let model = ScriptedModel {
            predictions: vec![
                prediction(d(2024, 1, 1), 10.0, 9.0, 11.0),
                prediction(d(2024, 2, 15), 20.0, 19.0, 21.0),
                prediction(d(2024, 3, 1), 30.0, 29.0, 31.0),
            ],
        };
        let adapter = ForecastAdapter::new(model);
        let series = monthly(&[(d(2024, 1, 1), 10.0), (d(2024, 2, 1), 20.0)]);
        let err = adapter
            .forecast(&series, &ForecastRequest::new(1, BucketUnit::Month))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Forecast { .. }));

        let short = ForecastAdapter::new(ScriptedModel {
            predictions: vec![prediction(d(2024, 1, 1), 10.0, 9.0, 11.0)],
        });
        assert!(matches!(
            short.forecast(&series, &ForecastRequest::new(1, BucketUnit::Month)),
            Err(PipelineError::Forecast { .. })
        ));
    }
}
