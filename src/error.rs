use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Missing required columns: {} (found: {})", missing.join(", "), found.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Duplicate column '{0}' after normalizing header names")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {count} unparseable date values (first at data row {first_row})")]
    UnparseableDates {
        column: String,
        count: usize,
        first_row: usize,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("No records remain after filtering ({total} records before filters)")]
    EmptyResult { total: usize },

    #[error("Insufficient data for forecasting: need ≥{required} periods, found {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("Forecast failed in model '{model}': {details}")]
    Forecast { model: String, details: String },

    #[error("Invalid forecast request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
