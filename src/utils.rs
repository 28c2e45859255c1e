use crate::error::{PipelineError, Result};
use crate::schema::BucketUnit;
use chrono::{Datelike, Days, Months, NaiveDate};

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        PipelineError::DateError(format!("Invalid year/month: {}-{:02}", year, month))
    })
}

/// Shifts a date by a signed number of months, clamping the day to the target month.
pub fn add_months(date: NaiveDate, months: i32) -> Result<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };

    shifted.ok_or_else(|| {
        PipelineError::DateError(format!("Shifting {} by {} months overflows", date, months))
    })
}

pub fn validate_fiscal_year_start_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(PipelineError::Config(format!(
            "fiscal_year_start_month must be between 1 and 12, got {}",
            month
        )));
    }
    Ok(())
}

/// Start of the bucket containing `date`.
///
/// Quarter, half-year and year buckets are blocks of 3, 6 and 12 months anchored at
/// `fiscal_year_start_month`; with the anchor at January they are calendar quarters,
/// halves and years.
pub fn bucket_start(
    date: NaiveDate,
    unit: BucketUnit,
    fiscal_year_start_month: u32,
) -> Result<NaiveDate> {
    let span = match unit.months() {
        None => return Ok(date),
        Some(span) => span as i32,
    };

    let offset = (date.month() as i32 - fiscal_year_start_month as i32).rem_euclid(span);
    let month_index = date.year() * 12 + date.month0() as i32 - offset;

    first_of_month(
        month_index.div_euclid(12),
        month_index.rem_euclid(12) as u32 + 1,
    )
}

/// Start of the bucket following the one that starts at `start`.
pub fn next_bucket_start(start: NaiveDate, unit: BucketUnit) -> Result<NaiveDate> {
    match unit.months() {
        None => start
            .checked_add_days(Days::new(1))
            .ok_or_else(|| PipelineError::DateError(format!("No day after {}", start))),
        Some(span) => add_months(start, span as i32),
    }
}

/// Every bucket start from `start` through `end` inclusive. `start` must already be
/// aligned to the bucket grid.
pub fn bucket_starts_between(
    start: NaiveDate,
    end: NaiveDate,
    unit: BucketUnit,
) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    let mut current = start;

    while current <= end {
        dates.push(current);
        current = next_bucket_start(current, unit)?;
    }

    Ok(dates)
}

/// `count` consecutive bucket starts following `last`. Fails with `DateError` once the
/// calendar runs out, before `count` is reached.
pub fn bucket_starts_after(last: NaiveDate, unit: BucketUnit, count: usize) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    let mut current = last;

    for _ in 0..count {
        current = next_bucket_start(current, unit)?;
        dates.push(current);
    }

    Ok(dates)
}

/// Fiscal year a date belongs to, labelled by the calendar year in which that fiscal
/// year ends.
///
/// # Examples
/// - Start month 1: 2024-03-15 is FY2024
/// - Start month 7: 2023-08-01 is FY2024, 2024-06-30 is FY2024, 2024-07-01 is FY2025
pub fn fiscal_year_of(date: NaiveDate, fiscal_year_start_month: u32) -> i32 {
    if fiscal_year_start_month <= 1 || date.month() < fiscal_year_start_month {
        date.year()
    } else {
        date.year() + 1
    }
}

pub fn days_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(d(2024, 1, 31), 1).unwrap(), d(2024, 2, 29));
        assert_eq!(add_months(d(2024, 3, 1), -3).unwrap(), d(2023, 12, 1));
    }

    #[test]
    fn test_bucket_start_calendar() {
        let date = d(2024, 8, 17);
        assert_eq!(bucket_start(date, BucketUnit::Day, 1).unwrap(), date);
        assert_eq!(bucket_start(date, BucketUnit::Month, 1).unwrap(), d(2024, 8, 1));
        assert_eq!(bucket_start(date, BucketUnit::Quarter, 1).unwrap(), d(2024, 7, 1));
        assert_eq!(bucket_start(date, BucketUnit::HalfYear, 1).unwrap(), d(2024, 7, 1));
        assert_eq!(bucket_start(date, BucketUnit::Year, 1).unwrap(), d(2024, 1, 1));
    }

    #[test]
    fn test_bucket_start_year_boundaries() {
        assert_eq!(bucket_start(d(2024, 1, 1), BucketUnit::Quarter, 1).unwrap(), d(2024, 1, 1));
        assert_eq!(bucket_start(d(2023, 12, 31), BucketUnit::Quarter, 1).unwrap(), d(2023, 10, 1));
        assert_eq!(bucket_start(d(2023, 12, 31), BucketUnit::HalfYear, 1).unwrap(), d(2023, 7, 1));
        assert_eq!(bucket_start(d(2024, 6, 30), BucketUnit::HalfYear, 1).unwrap(), d(2024, 1, 1));
    }

    #[test]
    fn test_bucket_start_fiscal_anchor() {
        // July fiscal year: quarters start Jul/Oct/Jan/Apr, halves Jul/Jan
        assert_eq!(bucket_start(d(2024, 2, 10), BucketUnit::Quarter, 7).unwrap(), d(2024, 1, 1));
        assert_eq!(bucket_start(d(2024, 6, 30), BucketUnit::Quarter, 7).unwrap(), d(2024, 4, 1));
        assert_eq!(bucket_start(d(2024, 3, 5), BucketUnit::Year, 7).unwrap(), d(2023, 7, 1));
        assert_eq!(bucket_start(d(2024, 7, 1), BucketUnit::Year, 7).unwrap(), d(2024, 7, 1));

        // February anchor: quarters Feb/May/Aug/Nov, so January belongs to the November block
        assert_eq!(bucket_start(d(2024, 1, 15), BucketUnit::Quarter, 2).unwrap(), d(2023, 11, 1));
    }

    #[test]
    fn test_bucket_grid() {
        let grid = bucket_starts_between(d(2023, 10, 1), d(2024, 4, 1), BucketUnit::Quarter).unwrap();
        assert_eq!(grid, vec![d(2023, 10, 1), d(2024, 1, 1), d(2024, 4, 1)]);

        let future = bucket_starts_after(d(2024, 12, 30), BucketUnit::Day, 3).unwrap();
        assert_eq!(future, vec![d(2024, 12, 31), d(2025, 1, 1), d(2025, 1, 2)]);

        assert!(bucket_starts_between(d(2024, 2, 1), d(2024, 1, 1), BucketUnit::Month)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_bucket_starts_after_stops_at_calendar_end() {
        let near_end = NaiveDate::MAX - Days::new(2);
        let err = bucket_starts_after(near_end, BucketUnit::Day, usize::MAX).unwrap_err();
        assert!(matches!(err, PipelineError::DateError(_)));

        let err = bucket_starts_after(d(2024, 1, 1), BucketUnit::Year, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, PipelineError::DateError(_)));
    }

    #[test]
    fn test_fiscal_year_of() {
        assert_eq!(fiscal_year_of(d(2024, 3, 15), 1), 2024);
        assert_eq!(fiscal_year_of(d(2023, 8, 1), 7), 2024);
        assert_eq!(fiscal_year_of(d(2024, 6, 30), 7), 2024);
        assert_eq!(fiscal_year_of(d(2024, 7, 1), 7), 2025);
    }

    #[test]
    fn test_validate_fiscal_year_start_month() {
        assert!(validate_fiscal_year_start_month(1).is_ok());
        assert!(validate_fiscal_year_start_month(12).is_ok());
        assert!(validate_fiscal_year_start_month(0).is_err());
        assert!(validate_fiscal_year_start_month(13).is_err());
    }
}
