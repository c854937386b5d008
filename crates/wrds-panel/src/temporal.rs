//! Grouped time-series utilities.
//!
//! Lags and differences are computed inside one entity group at a time, so a
//! value never leaks from one company or security into the next. The panel
//! must already be sorted by entity and date; [`crate::derive_panel`] takes
//! care of that before evaluating any formula.

use crate::EntityKey;
use chrono::{Datelike, Months, NaiveDate};
use polars::prelude::*;

/// Shift `x` forward by `n` rows within each entity group.
///
/// The first `n` observations of every group are null.
pub fn lag(x: Expr, n: i64, key: EntityKey) -> Expr {
    x.shift(lit(n)).over([col(key.column())])
}

/// `x - lag(x, n)` within each entity group.
pub fn diff(x: Expr, n: i64, key: EntityKey) -> Expr {
    x.clone() - lag(x, n, key)
}

/// Fill nulls in `x` from `fallbacks`, trying each fallback in order.
///
/// Present values of `x` are never replaced, and an empty fallback list
/// returns `x` unchanged.
pub fn coalesce<I>(x: Expr, fallbacks: I) -> Expr
where
    I: IntoIterator<Item = Expr>,
{
    fallbacks
        .into_iter()
        .fold(x, |filled, fallback| filled.fill_null(fallback))
}

/// Division that yields null for a zero or null denominator.
pub fn safe_div(numerator: Expr, denominator: Expr) -> Expr {
    let numerator = numerator.cast(DataType::Float64);
    let denominator = denominator.cast(DataType::Float64);
    when(denominator.clone().eq(lit(0.0)))
        .then(lit(NULL))
        .otherwise(numerator / denominator)
}

/// Natural logarithm that yields null for non-positive input.
pub fn safe_log(x: Expr) -> Expr {
    let x = x.cast(DataType::Float64);
    when(x.clone().gt(lit(0.0)))
        .then(x.log(std::f64::consts::E))
        .otherwise(lit(NULL))
}

/// Average of the current and previous observation, `(x + lag(x)) / 2`.
pub fn lagged_mean(x: Expr, key: EntityKey) -> Expr {
    (x.clone() + lag(x, 1, key)) / lit(2.0)
}

/// Move `date` forward by `months` calendar month ends.
///
/// A date that already sits on a month end advances `months` month ends. A
/// mid-month date first rolls to its own month end, which counts as the first
/// step. Zero months leaves the date untouched. Returns `None` only when the
/// result falls outside chrono's calendar.
pub fn shift_month_end(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    if months == 0 {
        return Some(date);
    }
    let steps = if is_month_end(date) { months } else { months - 1 };
    date.with_day(1)?
        .checked_add_months(Months::new(steps + 1))?
        .pred_opt()
}

fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt()
        .is_none_or(|next| next.month() != date.month())
}
