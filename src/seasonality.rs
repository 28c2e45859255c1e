use crate::error::{PipelineError, Result};
use crate::schema::BucketUnit;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;

pub const YEARLY_PERIOD_DAYS: f64 = 365.25;
pub const YEARLY_FOURIER_ORDER: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeasonalComponent {
    #[schemars(description = "Unique name of the component, e.g. 'monthly'.")]
    pub name: String,

    #[schemars(description = "Length of one seasonal cycle in days (e.g. 30.5 for monthly, 365.25 for yearly).")]
    pub period_days: f64,

    #[schemars(description = "Number of Fourier harmonics used to represent the cycle. Higher orders fit sharper patterns.")]
    pub fourier_order: usize,
}

impl SeasonalComponent {
    pub fn new(name: impl Into<String>, period_days: f64, fourier_order: usize) -> Self {
        Self {
            name: name.into(),
            period_days,
            fourier_order,
        }
    }

    pub fn yearly() -> Self {
        Self::new("yearly", YEARLY_PERIOD_DAYS, YEARLY_FOURIER_ORDER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum YearlySeasonality {
    #[default]
    #[schemars(
        description = "Enable the yearly component when history covers at least two years and buckets are finer than a year."
    )]
    Auto,

    #[schemars(description = "Always fit a yearly component.")]
    Enabled,

    #[schemars(description = "Never fit a yearly component.")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SeasonalityOptions {
    #[serde(default)]
    pub yearly: YearlySeasonality,

    #[serde(default)]
    #[schemars(description = "Additional custom seasonal components fitted alongside the trend.")]
    pub components: Vec<SeasonalComponent>,
}

impl SeasonalityOptions {
    #[must_use]
    pub fn with_component(mut self, component: SeasonalComponent) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn with_yearly(mut self, yearly: YearlySeasonality) -> Self {
        self.yearly = yearly;
        self
    }
}

pub fn validate_components(components: &[SeasonalComponent]) -> Result<()> {
    let mut seen = HashSet::new();

    for component in components {
        if component.name.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Seasonal component name must not be empty".to_string(),
            ));
        }
        if !seen.insert(component.name.as_str()) {
            return Err(PipelineError::InvalidRequest(format!(
                "Duplicate seasonal component '{}'",
                component.name
            )));
        }
        if !component.period_days.is_finite() || component.period_days <= 0.0 {
            return Err(PipelineError::InvalidRequest(format!(
                "Seasonal component '{}' has invalid period {} (must be > 0 days)",
                component.name, component.period_days
            )));
        }
        if component.fourier_order == 0 {
            return Err(PipelineError::InvalidRequest(format!(
                "Seasonal component '{}' must have a Fourier order of at least 1",
                component.name
            )));
        }
    }

    Ok(())
}

/// Expands the options into the concrete list handed to the model.
///
/// A custom component named `yearly` takes precedence over the built-in one.
pub fn resolve_components(
    options: &SeasonalityOptions,
    history_span_days: f64,
    unit: BucketUnit,
) -> Vec<SeasonalComponent> {
    let custom_yearly = options.components.iter().any(|c| c.name == "yearly");
    let include_yearly = match options.yearly {
        YearlySeasonality::Enabled => true,
        YearlySeasonality::Disabled => false,
        YearlySeasonality::Auto => {
            unit != BucketUnit::Year && history_span_days >= 2.0 * YEARLY_PERIOD_DAYS
        }
    };

    let mut resolved = Vec::with_capacity(options.components.len() + 1);
    if include_yearly && !custom_yearly {
        resolved.push(SeasonalComponent::yearly());
    }
    resolved.extend(options.components.iter().cloned());
    resolved
}

/// Fourier basis for one component at `t_days`: `[sin(2πkt/P), cos(2πkt/P)]` for
/// k = 1..=order, interleaved.
pub fn fourier_features(t_days: f64, component: &SeasonalComponent) -> Vec<f64> {
    let mut features = Vec::with_capacity(2 * component.fourier_order);
    for k in 1..=component.fourier_order {
        let angle = 2.0 * PI * k as f64 * t_days / component.period_days;
        features.push(angle.sin());
        features.push(angle.cos());
    }
    features
}
