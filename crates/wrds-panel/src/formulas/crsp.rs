//! CRSP return helpers.

use crate::EntityKey;
use crate::temporal::{diff, safe_log};
use polars::prelude::*;

/// Compound a sequence of simple returns, `exp(sum(log(1 + r))) - 1`.
pub fn compound_return(returns: &[f64]) -> f64 {
    returns.iter().map(|r| r.ln_1p()).sum::<f64>().exp() - 1.0
}

fn rolling_log_growth(ret: Expr, periods: usize) -> Expr {
    safe_log(ret.cast(DataType::Float64) + lit(1.0)).rolling_sum(RollingOptionsFixedWindow {
        window_size: periods,
        min_periods: periods,
        ..Default::default()
    })
}

/// Trailing `periods`-period compounded return within each security.
pub fn momentum(ret: Expr, periods: usize, key: EntityKey) -> Expr {
    rolling_log_growth(ret, periods)
        .over([col(key.column())])
        .exp()
        - lit(1.0)
}

/// Composite equity issuance over `periods` months.
///
/// The growth in market equity not explained by returns: `log(BR) - log(LR)`
/// where `BR = exp(diff(log(me), periods))` and `LR` is the previous period's
/// compounded return over the same window, with missing returns treated as
/// zero. `log(LR)` is taken on the net compounded return, so windows with a
/// cumulative loss are null.
pub fn composite_equity_issuance(ret: Expr, me: Expr, periods: usize, key: EntityKey) -> Expr {
    let log_book_growth = diff(safe_log(me), periods as i64, key);
    let lagged_return = rolling_log_growth(ret.fill_null(lit(0.0)), periods)
        .shift(lit(1))
        .over([col(key.column())])
        .exp()
        - lit(1.0);
    log_book_growth - safe_log(lagged_return)
}
