use crate::error::{ReconError, Result};
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::thread;

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Normalizes any date to the month end of the period it falls in.
pub fn period_end(date: NaiveDate) -> NaiveDate {
    last_day_of_month(date.year(), date.month()).unwrap_or(date)
}

pub fn same_period(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Parses a reporting period in the format "YYYY-MM" or "YYYY-MM-DD".
/// Returns the month-end date identifying the period.
pub fn parse_period(period: &str) -> Result<NaiveDate> {
    let trimmed = period.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(period_end(date));
    }

    let start = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d")
        .map_err(|_| ReconError::InvalidPeriod(period.to_string()))?;

    last_day_of_month(start.year(), start.month())
        .ok_or_else(|| ReconError::InvalidPeriod(period.to_string()))
}

/// Lossy conversion used only for anomaly features, never for balances.
pub fn decimal_to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}

/// Applies `f` to every item on scoped worker threads, preserving input order.
pub(crate) fn par_map<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(items.len());
    let chunk_size = items.len().div_ceil(workers);
    let f = &f;

    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(f).collect::<Vec<R>>()))
            .collect();

        let mut out = Vec::with_capacity(items.len());
        for handle in handles {
            match handle.join() {
                Ok(part) => out.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        out
    })
}
