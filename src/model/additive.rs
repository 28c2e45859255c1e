//! Additive trend + seasonality model.
//!
//! `y(t) = a + b·t + Σ seasonal Fourier terms + ε`, with `t` the time since the first
//! observation scaled so the history spans `[0, 1]` and `y` scaled by its maximum
//! absolute value. Seasonal coefficients carry a ridge penalty of
//! `1 / seasonality_prior_scale²`, which keeps the system solvable when there are more
//! harmonics than observations.
//!
//! Uncertainty combines observation noise (residual standard deviation) with slope
//! uncertainty that grows linearly past the last observation.

use super::{ForecastModel, ModelError, ModelInput, ModelPrediction};
use crate::seasonality::{fourier_features, SeasonalComponent};
use crate::utils::days_between;
use chrono::NaiveDate;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal as StandardNormal};

const SLOPE: usize = 1;
const TREND_TERMS: usize = 2;
const MIN_OBSERVATIONS: usize = 2;

fn default_seasonality_prior_scale() -> f64 {
    10.0
}

fn default_uncertainty_samples() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdditiveModelConfig {
    #[serde(default = "default_seasonality_prior_scale")]
    #[schemars(
        description = "Prior scale of the seasonal coefficients. Smaller values damp seasonality; must be > 0."
    )]
    pub seasonality_prior_scale: f64,

    #[serde(default = "default_uncertainty_samples")]
    #[schemars(
        description = "Number of simulated paths used to estimate the uncertainty interval. 0 uses closed-form normal quantiles."
    )]
    pub uncertainty_samples: usize,

    #[serde(default)]
    #[schemars(description = "Seed for the interval simulation, so repeated runs give identical bounds.")]
    pub seed: u64,
}

impl Default for AdditiveModelConfig {
    fn default() -> Self {
        Self {
            seasonality_prior_scale: default_seasonality_prior_scale(),
            uncertainty_samples: default_uncertainty_samples(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdditiveModel {
    name: String,
    config: AdditiveModelConfig,
}

impl AdditiveModel {
    pub fn new(config: AdditiveModelConfig) -> Result<Self, ModelError> {
        let scale = config.seasonality_prior_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "seasonality_prior_scale must be a positive number, got {}",
                scale
            )));
        }

        Ok(Self {
            name: model_name(scale),
            config,
        })
    }

    pub fn config(&self) -> &AdditiveModelConfig {
        &self.config
    }
}

impl Default for AdditiveModel {
    fn default() -> Self {
        let config = AdditiveModelConfig::default();
        Self {
            name: model_name(config.seasonality_prior_scale),
            config,
        }
    }
}

fn model_name(prior_scale: f64) -> String {
    format!("Additive trend + seasonality (prior scale={})", prior_scale)
}

/// Maps a timestamp to its regression features.
struct Design<'a> {
    origin: NaiveDate,
    span_days: f64,
    components: &'a [SeasonalComponent],
}

impl Design<'_> {
    fn width(&self) -> usize {
        TREND_TERMS
            + self
                .components
                .iter()
                .map(|c| 2 * c.fourier_order)
                .sum::<usize>()
    }

    fn row(&self, date: NaiveDate) -> Vec<f64> {
        let days = days_between(self.origin, date);
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(days / self.span_days);
        for component in self.components {
            row.extend(fourier_features(days, component));
        }
        row
    }
}

struct Fit {
    coefficients: Vec<f64>,
    /// Residual standard deviation, in scaled units
    sigma: f64,
    /// Standard error of the slope, in scaled units per scaled time
    slope_sd: f64,
}

impl AdditiveModel {
    fn fit(&self, design: &Design<'_>, observations: &[(NaiveDate, f64)]) -> Result<Fit, ModelError> {
        let width = design.width();
        let mut xtx = vec![vec![0.0; width]; width];
        let mut xty = vec![0.0; width];
        let mut rows = Vec::with_capacity(observations.len());

        for &(date, y) in observations {
            let row = design.row(date);
            for i in 0..width {
                xty[i] += row[i] * y;
                for j in 0..width {
                    xtx[i][j] += row[i] * row[j];
                }
            }
            rows.push(row);
        }

        let penalty = 1.0 / self.config.seasonality_prior_scale.powi(2);
        for (j, row) in xtx.iter_mut().enumerate().skip(TREND_TERMS) {
            row[j] += penalty;
        }

        let coefficients = solve(xtx.clone(), xty).ok_or(ModelError::SingularSystem)?;

        let ssr: f64 = rows
            .iter()
            .zip(observations)
            .map(|(row, &(_, y))| (y - dot(row, &coefficients)).powi(2))
            .sum();
        let dof = observations.len().saturating_sub(TREND_TERMS).max(1) as f64;
        let sigma = (ssr / dof).sqrt();

        let mut unit = vec![0.0; width];
        unit[SLOPE] = 1.0;
        let inverse_column = solve(xtx, unit).ok_or(ModelError::SingularSystem)?;
        let slope_sd = sigma * inverse_column[SLOPE].max(0.0).sqrt();

        Ok(Fit {
            coefficients,
            sigma,
            slope_sd,
        })
    }

    fn simulated_bounds(
        &self,
        points: &[f64],
        excess: &[f64],
        fit: &Fit,
        interval_width: f64,
    ) -> Result<Vec<(f64, f64)>, ModelError> {
        let invalid = |e: rand_distr::NormalError| ModelError::InvalidParameter(e.to_string());
        let slope_noise = Normal::new(0.0, fit.slope_sd).map_err(invalid)?;
        let observation_noise = Normal::new(0.0, fit.sigma).map_err(invalid)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let slope_draws: Vec<f64> = (0..self.config.uncertainty_samples)
            .map(|_| slope_noise.sample(&mut rng))
            .collect();

        let lower_q = (1.0 - interval_width) / 2.0;
        let upper_q = (1.0 + interval_width) / 2.0;

        let mut samples = Vec::with_capacity(slope_draws.len());
        let bounds = points
            .iter()
            .zip(excess)
            .map(|(&point, &ahead)| {
                samples.clear();
                samples.extend(
                    slope_draws
                        .iter()
                        .map(|delta| point + delta * ahead + observation_noise.sample(&mut rng)),
                );
                samples.sort_by(f64::total_cmp);
                (quantile(&samples, lower_q), quantile(&samples, upper_q))
            })
            .collect();

        Ok(bounds)
    }

    fn analytic_bounds(
        &self,
        points: &[f64],
        excess: &[f64],
        fit: &Fit,
        interval_width: f64,
    ) -> Result<Vec<(f64, f64)>, ModelError> {
        let standard = StandardNormal::new(0.0, 1.0)
            .map_err(|e| ModelError::InvalidParameter(e.to_string()))?;
        let z = standard.inverse_cdf(0.5 + interval_width / 2.0);

        Ok(points
            .iter()
            .zip(excess)
            .map(|(&point, &ahead)| {
                let sd = (fit.sigma.powi(2) + (fit.slope_sd * ahead).powi(2)).sqrt();
                (point - z * sd, point + z * sd)
            })
            .collect())
    }
}

impl ForecastModel for AdditiveModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit_predict(&self, input: &ModelInput) -> Result<Vec<ModelPrediction>, ModelError> {
        if input.history.len() < MIN_OBSERVATIONS {
            return Err(ModelError::TooFewObservations {
                required: MIN_OBSERVATIONS,
                found: input.history.len(),
            });
        }
        if !(input.interval_width > 0.0 && input.interval_width < 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "interval_width must be in (0, 1), got {}",
                input.interval_width
            )));
        }
        if let Some(&(date, value)) = input.history.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { date, value });
        }

        let origin = input.history[0].0;
        let last = input.history[input.history.len() - 1].0;
        let span_days = days_between(origin, last);
        if span_days <= 0.0 {
            return Err(ModelError::InvalidParameter(
                "history timestamps must span a positive interval".to_string(),
            ));
        }

        let y_scale = input
            .history
            .iter()
            .map(|(_, v)| v.abs())
            .fold(0.0_f64, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let scaled: Vec<(NaiveDate, f64)> = input
            .history
            .iter()
            .map(|&(date, value)| (date, value / y_scale))
            .collect();

        let design = Design {
            origin,
            span_days,
            components: &input.seasonalities,
        };
        let fit = self.fit(&design, &scaled)?;
        debug!(
            "{}: fitted {} observations with {} terms (sigma={:.4}, slope_sd={:.4}, scale={})",
            self.name,
            scaled.len(),
            design.width(),
            fit.sigma,
            fit.slope_sd,
            y_scale
        );

        let mut points = Vec::with_capacity(input.timestamps.len());
        let mut excess = Vec::with_capacity(input.timestamps.len());
        for &date in &input.timestamps {
            let row = design.row(date);
            excess.push((row[SLOPE] - 1.0).max(0.0));
            points.push(dot(&row, &fit.coefficients));
        }

        let bounds = if self.config.uncertainty_samples == 0 {
            self.analytic_bounds(&points, &excess, &fit, input.interval_width)?
        } else {
            self.simulated_bounds(&points, &excess, &fit, input.interval_width)?
        };

        Ok(input
            .timestamps
            .iter()
            .zip(points)
            .zip(bounds)
            .map(|((&date, point), (lower, upper))| ModelPrediction {
                date,
                point: point * y_scale,
                lower: lower * y_scale,
                upper: upper * y_scale,
            })
            .collect())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let fraction = position - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
}

/// Gaussian elimination with partial pivoting. `None` when the matrix is singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let magnitude = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 * magnitude {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = a[col].clone();
        let pivot_value = b[col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (cell, &p) in a[row].iter_mut().zip(&pivot_row).skip(col) {
                *cell -= factor * p;
            }
            b[row] -= factor * pivot_value;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
