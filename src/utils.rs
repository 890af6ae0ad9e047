use crate::error::{InventoryWeeksError, Result};
use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Number of calendar days in the month (proleptic Gregorian, leap-year aware).
pub fn days_in_month(year: i32, month: u32) -> Result<u32> {
    validate_month(month)?;
    last_day_of_month(year, month)
        .map(|date| date.day())
        .ok_or_else(|| InventoryWeeksError::InvalidPeriod(format!("{year:04}.{month:02}")))
}

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(InventoryWeeksError::InvalidMonth(month));
    }
    Ok(())
}

/// Rounds to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses a monthly extract file stem in the format "YYYY.MM".
/// Returns (year, month)
pub fn parse_period_stem(stem: &str) -> Result<(i32, u32)> {
    let parts: Vec<&str> = stem.trim().split('.').collect();

    if parts.len() != 2 {
        return Err(InventoryWeeksError::InvalidPeriod(stem.to_string()));
    }

    let year: i32 = parts[0]
        .parse()
        .map_err(|_| InventoryWeeksError::InvalidPeriod(stem.to_string()))?;
    let month: u32 = parts[1]
        .parse()
        .map_err(|_| InventoryWeeksError::InvalidPeriod(stem.to_string()))?;

    validate_month(month)?;
    Ok((year, month))
}

/// Takes `len` characters starting at character offset `start`.
/// Shorter inputs yield a shorter (possibly empty) slice, never a panic.
pub fn char_slice(value: &str, start: usize, len: usize) -> String {
    value.chars().skip(start).take(len).collect()
}
