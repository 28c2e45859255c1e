//! Loading raw tables and turning them into typed donation records.
//!
//! A [`RawTable`] is the untyped view of an upload. [`SchemaValidator`] maps it onto
//! [`RawRecord`]s using an explicit [`ColumnMapping`], excluding rows whose date or
//! amount cannot be coerced and reporting each exclusion.

use crate::config::{normalize_name, ColumnMapping, DateParseMode, PipelineConfig};
use crate::error::{PipelineError, Result, SchemaError};
use crate::schema::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Reads a headed CSV. Rows may be shorter or longer than the header.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }

        debug!("Read CSV table with {} columns and {} rows", headers.len(), rows.len());
        Ok(Self { headers, rows })
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_csv_reader(bytes)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_csv_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text, or `""` when the row is too short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn normalized_headers(headers: &[String]) -> std::result::Result<Vec<String>, SchemaError> {
    let mut normalized: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let name = normalize_name(header);
        if normalized.contains(&name) {
            return Err(SchemaError::DuplicateColumn(name));
        }
        normalized.push(name);
    }
    Ok(normalized)
}

fn missing_columns(headers: &[String], required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !headers.contains(name))
        .cloned()
        .collect()
}

/// Lowercases and trims every header, then checks that each `required` column is present.
///
/// All missing columns are reported at once, together with the columns that were found.
pub fn normalize_columns<S: AsRef<str>>(
    table: RawTable,
    required: &[S],
) -> std::result::Result<RawTable, SchemaError> {
    let headers = normalized_headers(&table.headers)?;
    let required: Vec<String> = required.iter().map(|r| normalize_name(r.as_ref())).collect();

    let missing = missing_columns(&headers, &required);
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns {
            missing,
            found: headers,
        });
    }

    Ok(RawTable {
        headers,
        rows: table.rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    UnparseableDate(String),
    InvalidAmount(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnparseableDate(value) => write!(f, "unparseable date '{}'", value),
            RejectReason::InvalidAmount(value) => write!(f, "invalid amount '{}'", value),
        }
    }
}

/// A row excluded during validation. `row` is the 1-based data row (header not counted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedDataset {
    pub records: Vec<RawRecord>,
    pub rejections: Vec<RowRejection>,
    pub total_rows: usize,
}

impl ValidatedDataset {
    pub fn dropped_count(&self) -> usize {
        self.rejections.len()
    }

    pub fn dropped_dates(&self) -> usize {
        self.rejections
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::UnparseableDate(_)))
            .count()
    }

    pub fn dropped_amounts(&self) -> usize {
        self.rejections
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::InvalidAmount(_)))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    date: usize,
    donor: usize,
    campaign_type: usize,
    region: usize,
    amount: usize,
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    columns: ColumnMapping,
    date_mode: DateParseMode,
    date_formats: Vec<String>,
}

impl SchemaValidator {
    pub fn new(columns: ColumnMapping) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            columns,
            date_mode: defaults.date_mode,
            date_formats: defaults.date_formats,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            columns: config.columns.clone(),
            date_mode: config.date_mode,
            date_formats: config.date_formats.clone(),
        }
    }

    #[must_use]
    pub fn with_date_mode(mut self, date_mode: DateParseMode) -> Self {
        self.date_mode = date_mode;
        self
    }

    #[must_use]
    pub fn with_date_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn columns(&self) -> &ColumnMapping {
        &self.columns
    }

    fn resolve(&self, table: &RawTable) -> std::result::Result<ColumnIndices, SchemaError> {
        let headers = normalized_headers(&table.headers)?;
        let required = self.columns.required();

        let missing = missing_columns(&headers, &required);
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                missing,
                found: headers,
            });
        }

        let index_of = |name: &String| headers.iter().position(|h| h == name).unwrap_or(0);
        Ok(ColumnIndices {
            date: index_of(&required[0]),
            donor: index_of(&required[1]),
            campaign_type: index_of(&required[2]),
            region: index_of(&required[3]),
            amount: index_of(&required[4]),
        })
    }

    pub fn validate(&self, table: &RawTable) -> Result<ValidatedDataset> {
        let idx = self.resolve(table)?;

        let mut records = Vec::with_capacity(table.len());
        let mut rejections = Vec::new();

        for row in 0..table.len() {
            let row_number = row + 1;

            let raw_date = table.cell(row, idx.date);
            let date = match parse_date(raw_date, &self.date_formats) {
                Some(date) => date,
                None => {
                    rejections.push(RowRejection {
                        row: row_number,
                        reason: RejectReason::UnparseableDate(raw_date.to_string()),
                    });
                    continue;
                }
            };

            let raw_amount = table.cell(row, idx.amount);
            let amount = match parse_amount(raw_amount) {
                Some(amount) => amount,
                None => {
                    rejections.push(RowRejection {
                        row: row_number,
                        reason: RejectReason::InvalidAmount(raw_amount.to_string()),
                    });
                    continue;
                }
            };

            records.push(RawRecord {
                date,
                donor: table.cell(row, idx.donor).trim().to_string(),
                campaign_type: table.cell(row, idx.campaign_type).trim().to_string(),
                region: table.cell(row, idx.region).trim().to_string(),
                amount,
            });
        }

        let dataset = ValidatedDataset {
            records,
            rejections,
            total_rows: table.len(),
        };

        if self.date_mode == DateParseMode::Strict && dataset.dropped_dates() > 0 {
            let first_row = dataset
                .rejections
                .iter()
                .find(|r| matches!(r.reason, RejectReason::UnparseableDate(_)))
                .map(|r| r.row)
                .unwrap_or(0);
            return Err(SchemaError::UnparseableDates {
                column: self.columns.required()[0].clone(),
                count: dataset.dropped_dates(),
                first_row,
            }
            .into());
        }

        if dataset.dropped_count() > 0 {
            warn!(
                "Dropped {} of {} rows during validation ({} bad dates, {} bad amounts)",
                dataset.dropped_count(),
                dataset.total_rows,
                dataset.dropped_dates(),
                dataset.dropped_amounts()
            );
        }

        if dataset.records.is_empty() {
            return Err(PipelineError::EmptyResult {
                total: dataset.total_rows,
            });
        }

        info!(
            "Validated {} records from {} rows",
            dataset.records.len(),
            dataset.total_rows
        );
        Ok(dataset)
    }
}

/// Tries RFC 3339 first, then each format as a date and as a date-time.
pub fn parse_date<S: AsRef<str>>(value: &str, formats: &[S]) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }

    for format in formats {
        let format = format.as_ref();
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp.date());
        }
    }
    None
}

/// Parses a non-negative finite amount.
///
/// Commas, underscores and spaces are accepted only as thousands separators, between
/// groups of exactly three digits, so a decimal comma such as `1,5` is rejected.
pub fn parse_amount(value: &str) -> Option<f64> {
    let cleaned = strip_thousands_separators(value.trim())?;
    let amount: f64 = cleaned.parse().ok()?;
    if amount.is_finite() && amount >= 0.0 {
        Some(amount)
    } else {
        None
    }
}

fn strip_thousands_separators(value: &str) -> Option<String> {
    let is_separator = |c: char| c == ',' || c == '_' || c.is_whitespace();

    let (sign, unsigned) = match value.strip_prefix(|c| c == '-' || c == '+') {
        Some(rest) => value.split_at(value.len() - rest.len()),
        None => ("", value),
    };
    let (integer, fraction) = unsigned.split_at(unsigned.find('.').unwrap_or(unsigned.len()));
    let separator = match integer.chars().find(|c| is_separator(*c)) {
        Some(separator) => separator,
        None => return Some(value.to_string()),
    };

    let groups: Vec<&str> = integer.split(separator).collect();
    let is_digits = |group: &str| group.chars().all(|c| c.is_ascii_digit());
    let first_ok = (1..=3).contains(&groups[0].len()) && is_digits(groups[0]);
    let rest_ok = groups[1..].iter().all(|g| g.len() == 3 && is_digits(g));
    if !(first_ok && rest_ok) {
        return None;
    }

    Some(format!("{}{}{}", sign, groups.concat(), fraction))
}
