//! Contract between the forecast adapter and the curve-fitting engine.
//!
//! The adapter only ever talks to a [`ForecastModel`]: it hands over a dense history and
//! the full list of timestamps to predict, and receives one [`ModelPrediction`] per
//! timestamp. Anything implementing the trait can stand in for the built-in
//! [`AdditiveModel`].

use crate::seasonality::SeasonalComponent;
use chrono::NaiveDate;
use std::fmt::Debug;
use thiserror::Error;

pub mod additive;

pub use additive::{AdditiveModel, AdditiveModelConfig};

/// Input handed to a forecasting engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    /// Dense, strictly increasing `(timestamp, value)` history
    pub history: Vec<(NaiveDate, f64)>,
    /// Timestamps to predict: the history dates followed by the future dates
    pub timestamps: Vec<NaiveDate>,
    /// Seasonal components to fit in addition to the trend
    pub seasonalities: Vec<SeasonalComponent>,
    /// Probability mass covered by `[lower, upper]`, in (0, 1)
    pub interval_width: f64,
}

/// Engine output for a single timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrediction {
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("need at least {required} observations to fit, got {found}")]
    TooFewObservations { required: usize, found: usize },

    #[error("non-finite observation {value} at {date}")]
    NonFiniteInput { date: NaiveDate, value: f64 },

    #[error("normal equations are singular")]
    SingularSystem,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A black-box engine that fits a history and predicts every requested timestamp.
pub trait ForecastModel: Debug {
    /// Name of the model, used in diagnostics
    fn name(&self) -> &str;

    /// Fit `input.history` and return one prediction per entry of `input.timestamps`,
    /// in the same order.
    fn fit_predict(&self, input: &ModelInput) -> Result<Vec<ModelPrediction>, ModelError>;
}

impl<M: ForecastModel + ?Sized> ForecastModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fit_predict(&self, input: &ModelInput) -> Result<Vec<ModelPrediction>, ModelError> {
        (**self).fit_predict(input)
    }
}
