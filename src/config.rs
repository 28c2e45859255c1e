use crate::compare::PeriodGrouping;
use crate::error::{PipelineError, Result};
use crate::forecast::{ForecastRequest, MAX_FORECAST_HORIZON};
use crate::model::AdditiveModelConfig;
use crate::schema::BucketUnit;
use crate::seasonality::{validate_components, SeasonalComponent, SeasonalityOptions};
use crate::utils::validate_fiscal_year_start_month;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maps logical fields to column names of the uploaded table.
///
/// Names are compared after trimming and lowercasing, on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMapping {
    #[serde(default = "default_date_column")]
    #[schemars(description = "Column holding the transaction date.")]
    pub date: String,

    #[serde(default = "default_donor_column")]
    pub donor: String,

    #[serde(default = "default_campaign_type_column")]
    pub campaign_type: String,

    #[serde(default = "default_region_column")]
    pub region: String,

    #[serde(default = "default_amount_column")]
    #[schemars(description = "Column holding the donated amount, e.g. 'total_donations_rwf'.")]
    pub amount: String,
}

fn default_date_column() -> String {
    "date".to_string()
}

fn default_donor_column() -> String {
    "donor".to_string()
}

fn default_campaign_type_column() -> String {
    "campaign_type".to_string()
}

fn default_region_column() -> String {
    "region".to_string()
}

fn default_amount_column() -> String {
    "amount".to_string()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            date: default_date_column(),
            donor: default_donor_column(),
            campaign_type: default_campaign_type_column(),
            region: default_region_column(),
            amount: default_amount_column(),
        }
    }
}

impl ColumnMapping {
    /// Normalized column names in field order: date, donor, campaign type, region, amount.
    pub fn required(&self) -> Vec<String> {
        [
            &self.date,
            &self.donor,
            &self.campaign_type,
            &self.region,
            &self.amount,
        ]
        .iter()
        .map(|name| normalize_name(name))
        .collect()
    }

    /// Guesses a mapping from header names by substring match.
    ///
    /// A convenience for interactive callers; the validator itself only ever uses an
    /// explicit mapping. Returns `None` unless every field finds a distinct column.
    pub fn detect<S: AsRef<str>>(headers: &[S]) -> Option<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_name(h.as_ref())).collect();
        let mut taken: Vec<&str> = Vec::new();

        let mut pick = |needles: &[&str]| -> Option<String> {
            for needle in needles {
                let found = normalized
                    .iter()
                    .find(|name| name.contains(needle) && !taken.contains(&name.as_str()));
                if let Some(name) = found {
                    taken.push(name.as_str());
                    return Some(name.clone());
                }
            }
            None
        };

        let date = pick(&["date", "time", "day"])?;
        let campaign_type = pick(&["campaign", "appeal", "fund"])?;
        let donor = pick(&["donor", "giver", "supporter", "contributor"])?;
        let region = pick(&["region", "area", "location", "district", "province"])?;
        let amount = pick(&["amount", "donation", "total", "value", "gift"])?;

        Some(Self {
            date,
            donor,
            campaign_type,
            region,
            amount,
        })
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateParseMode {
    #[default]
    #[schemars(description = "Drop rows whose date cannot be parsed and report how many were dropped.")]
    Lenient,

    #[schemars(description = "Fail the whole load if any date cannot be parsed.")]
    Strict,
}

fn default_date_formats() -> Vec<String> {
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn default_fiscal_year_start_month() -> u32 {
    1
}

fn default_bucket() -> BucketUnit {
    BucketUnit::Month
}

fn default_horizon() -> usize {
    36
}

fn default_interval_width() -> f64 {
    0.8
}

fn default_seasonality() -> SeasonalityOptions {
    SeasonalityOptions::default().with_component(SeasonalComponent::new("monthly", 30.5, 5))
}

fn default_comparison() -> PeriodGrouping {
    PeriodGrouping::Year
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub columns: ColumnMapping,

    #[serde(default)]
    pub date_mode: DateParseMode,

    #[serde(default = "default_date_formats")]
    #[schemars(
        description = "chrono format strings tried in order when parsing dates. RFC 3339 timestamps are always accepted."
    )]
    pub date_formats: Vec<String>,

    #[serde(default = "default_fiscal_year_start_month")]
    #[schemars(
        description = "Month (1-12) at which quarter, half-year and year buckets are anchored. 1 gives calendar quarters."
    )]
    pub fiscal_year_start_month: u32,

    #[serde(default = "default_bucket")]
    pub bucket: BucketUnit,

    #[serde(default = "default_horizon")]
    #[schemars(description = "Number of future buckets to forecast. Must be > 0.")]
    pub horizon: usize,

    #[serde(default = "default_interval_width")]
    #[schemars(description = "Width of the uncertainty interval, strictly between 0 and 1.")]
    pub interval_width: f64,

    #[serde(default = "default_seasonality")]
    pub seasonality: SeasonalityOptions,

    #[serde(default = "default_comparison")]
    #[schemars(description = "Period used to group actuals and forecasts in the comparison table.")]
    pub comparison: PeriodGrouping,

    #[serde(default)]
    pub model: AdditiveModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            date_mode: DateParseMode::default(),
            date_formats: default_date_formats(),
            fiscal_year_start_month: default_fiscal_year_start_month(),
            bucket: default_bucket(),
            horizon: default_horizon(),
            interval_width: default_interval_width(),
            seasonality: default_seasonality(),
            comparison: default_comparison(),
            model: AdditiveModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a `.toml` or `.json` file, chosen by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(PipelineError::Config(format!(
                "Unsupported config file extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fiscal_year_start_month(self.fiscal_year_start_month)?;

        let required = self.columns.required();
        for (idx, name) in required.iter().enumerate() {
            if name.is_empty() {
                return Err(PipelineError::Config(format!(
                    "columns: mapping #{} is empty",
                    idx
                )));
            }
            if required[..idx].contains(name) {
                return Err(PipelineError::Config(format!(
                    "columns: '{}' is mapped to more than one field",
                    name
                )));
            }
        }

        if self.date_formats.is_empty() {
            return Err(PipelineError::Config(
                "date_formats must list at least one format".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(PipelineError::Config("horizon must be greater than zero".to_string()));
        }
        if self.horizon > MAX_FORECAST_HORIZON {
            return Err(PipelineError::Config(format!(
                "horizon must be at most {}, got {}",
                MAX_FORECAST_HORIZON, self.horizon
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(PipelineError::Config(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        let prior = self.model.seasonality_prior_scale;
        if !prior.is_finite() || prior <= 0.0 {
            return Err(PipelineError::Config(format!(
                "model.seasonality_prior_scale must be > 0, got {}",
                prior
            )));
        }
        validate_components(&self.seasonality.components)
            .map_err(|e| PipelineError::Config(format!("seasonality: {}", e)))
    }

    pub fn forecast_request(&self) -> ForecastRequest {
        ForecastRequest::new(self.horizon, self.bucket)
            .with_seasonality(self.seasonality.clone())
            .with_interval_width(self.interval_width)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
