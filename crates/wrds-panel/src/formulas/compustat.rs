//! Compustat accounting ratios.
//!
//! Every function takes its inputs as expressions and groups lags by the
//! given [`EntityKey`], which is `gvkey` for Compustat panels. Zero or missing
//! denominators produce nulls.

use crate::EntityKey;
use crate::temporal::{coalesce, diff, lag, lagged_mean, safe_div, safe_log};
use polars::prelude::*;

/// Net stock issuance, `diff(log(csho * ajex))`.
pub fn net_stock_issuance(csho: Expr, ajex: Expr, key: EntityKey) -> Expr {
    diff(safe_log(csho * ajex), 1, key)
}

/// Total accruals scaled by average total assets.
///
/// `((diff(act) - diff(che)) - (diff(lct) - diff(dlc) - diff(txp)) - dp) / ((at + lag(at)) / 2)`
#[allow(clippy::too_many_arguments)]
pub fn total_accruals(
    act: Expr,
    che: Expr,
    lct: Expr,
    dlc: Expr,
    txp: Expr,
    dp: Expr,
    at: Expr,
    key: EntityKey,
) -> Expr {
    let current_assets = diff(act, 1, key) - diff(che, 1, key);
    let current_liabilities = diff(lct, 1, key) - diff(dlc, 1, key) - diff(txp, 1, key);
    safe_div(
        current_assets - current_liabilities - dp,
        lagged_mean(at, key),
    )
}

/// Net operating assets scaled by lagged total assets.
#[allow(clippy::too_many_arguments)]
pub fn net_operating_assets(
    at: Expr,
    che: Expr,
    dlc: Expr,
    dltt: Expr,
    mib: Expr,
    pstk: Expr,
    ceq: Expr,
    key: EntityKey,
) -> Expr {
    let operating_assets = at.clone() - che;
    let operating_liabilities = at.clone() - dlc - dltt - mib - pstk - ceq;
    safe_div(operating_assets - operating_liabilities, lag(at, 1, key))
}

/// Gross profitability, `gp / at`.
pub fn gross_profitability(gp: Expr, at: Expr) -> Expr {
    safe_div(gp, at)
}

/// Asset growth, `at / lag(at) - 1`.
pub fn asset_growth(at: Expr, key: EntityKey) -> Expr {
    safe_div(at.clone(), lag(at, 1, key)) - lit(1.0)
}

/// Investment-to-assets, `(diff(ppegt) + diff(invt)) / lag(at)`.
pub fn investment_to_assets(ppegt: Expr, invt: Expr, at: Expr, key: EntityKey) -> Expr {
    safe_div(diff(ppegt, 1, key) + diff(invt, 1, key), lag(at, 1, key))
}

/// Annual return on assets, `ib / at`.
pub fn return_on_assets(ib: Expr, at: Expr) -> Expr {
    safe_div(ib, at)
}

/// Quarterly return on assets, `ibq / lag(atq)`.
pub fn return_on_assets_quarterly(ibq: Expr, atq: Expr, key: EntityKey) -> Expr {
    safe_div(ibq, lag(atq, 1, key))
}

/// Inputs of Ohlson's O-Score.
#[derive(Debug, Clone)]
pub struct OScoreInputs {
    /// Total assets
    pub at: Expr,
    /// Long-term debt
    pub dltt: Expr,
    /// Debt in current liabilities
    pub dlc: Expr,
    /// Total liabilities
    pub lt: Expr,
    /// Current liabilities
    pub lct: Expr,
    /// Current assets
    pub act: Expr,
    /// Net income
    pub ni: Expr,
    /// Shareholders' equity
    pub seq: Expr,
    /// Working capital
    pub wcap: Expr,
    /// EBITDA
    pub ebitda: Expr,
}

impl OScoreInputs {
    /// Inputs read from the standard Compustat columns.
    pub fn from_columns() -> Self {
        Self {
            at: col("at"),
            dltt: col("dltt"),
            dlc: col("dlc"),
            lt: col("lt"),
            lct: col("lct"),
            act: col("act"),
            ni: col("ni"),
            seq: col("seq"),
            wcap: col("wcap"),
            ebitda: col("ebitda"),
        }
    }
}

/// Ohlson's O-Score.
///
/// Total assets enter the size term undeflated. Leverage falls back to total
/// liabilities when `dltt + dlc` is missing, and the two indicator terms count
/// as zero when their inputs are missing.
pub fn o_score(inputs: OScoreInputs, key: EntityKey) -> Expr {
    let OScoreInputs {
        at,
        dltt,
        dlc,
        lt,
        lct,
        act,
        ni,
        seq,
        wcap,
        ebitda,
    } = inputs;
    let ni = ni.cast(DataType::Float64);

    let leverage = coalesce(
        (dltt + dlc).cast(DataType::Float64),
        [lt.cast(DataType::Float64)],
    );
    let two_losses = lag(ni.clone(), 1, key)
        .lt(lit(0.0))
        .and(lag(ni.clone(), 2, key).lt(lit(0.0)))
        .fill_null(lit(false))
        .cast(DataType::Float64);
    let negative_equity = seq
        .cast(DataType::Float64)
        .lt(lit(0.0))
        .fill_null(lit(false))
        .cast(DataType::Float64);
    let income_change = safe_div(
        diff(ni.clone(), 1, key),
        ni.clone().abs() + lag(ni.clone(), 1, key).abs(),
    );

    lit(-1.32) - lit(0.407) * safe_log(at.clone())
        + lit(6.03) * safe_div(leverage.clone(), at.clone())
        - lit(1.43) * safe_div(wcap, at.clone())
        + lit(0.076) * safe_div(lct, act)
        - lit(2.37) * safe_div(ni, at)
        - lit(1.83) * safe_div(ebitda, leverage)
        + lit(0.285) * two_losses
        - lit(1.72) * negative_equity
        - lit(0.521) * income_change
}
