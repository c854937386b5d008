//! Financial formula library.
//!
//! [`Formula`] names each derived field a dataset can request. A formula knows
//! the base columns it reads (so query builders can select them) and builds
//! the polars expression that computes it. [`derive_panel`] evaluates a set of
//! formulas over a whole panel.

pub mod compustat;
pub mod crsp;

use crate::error::{PanelError, Result};
use crate::{DATE_COLUMN, EntityKey};
use compustat::OScoreInputs;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// A derived field computed on the materialized panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    /// Net stock issuance (`nsi`)
    NetStockIssuance,
    /// Total accruals (`tac`)
    TotalAccruals,
    /// Net operating assets (`noa`)
    NetOperatingAssets,
    /// Gross profitability (`gpa`)
    GrossProfitability,
    /// Asset growth (`ag`)
    AssetGrowth,
    /// Investment-to-assets (`ia`)
    InvestmentToAssets,
    /// Annual return on assets (`roa`)
    ReturnOnAssets,
    /// Quarterly return on assets (`roaq`)
    ReturnOnAssetsQuarterly,
    /// Ohlson's O-Score (`oscore`)
    OScore,
    /// Compounded return over a trailing window (`mom_{periods + 1}`)
    Momentum {
        /// Window length in periods
        periods: usize,
    },
    /// Composite equity issuance (`cei`)
    CompositeEquityIssuance {
        /// Window length in periods
        periods: usize,
    },
}

impl Formula {
    /// Name of the output column.
    pub fn output_name(&self) -> String {
        match self {
            Self::NetStockIssuance => "nsi".to_string(),
            Self::TotalAccruals => "tac".to_string(),
            Self::NetOperatingAssets => "noa".to_string(),
            Self::GrossProfitability => "gpa".to_string(),
            Self::AssetGrowth => "ag".to_string(),
            Self::InvestmentToAssets => "ia".to_string(),
            Self::ReturnOnAssets => "roa".to_string(),
            Self::ReturnOnAssetsQuarterly => "roaq".to_string(),
            Self::OScore => "oscore".to_string(),
            Self::Momentum { periods } => format!("mom_{}", periods + 1),
            Self::CompositeEquityIssuance { .. } => "cei".to_string(),
        }
    }

    /// Base columns the formula reads.
    pub const fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::NetStockIssuance => &["csho", "ajex"],
            Self::TotalAccruals => &["act", "che", "lct", "dlc", "txp", "dp", "at"],
            Self::NetOperatingAssets => &["at", "che", "dlc", "dltt", "mib", "pstk", "ceq"],
            Self::GrossProfitability => &["gp", "at"],
            Self::AssetGrowth => &["at"],
            Self::InvestmentToAssets => &["ppegt", "invt", "at"],
            Self::ReturnOnAssets => &["ib", "at"],
            Self::ReturnOnAssetsQuarterly => &["ibq", "atq"],
            Self::OScore => &[
                "at", "dltt", "dlc", "lt", "lct", "act", "ni", "seq", "wcap", "ebitda",
            ],
            Self::Momentum { .. } => &["ret"],
            Self::CompositeEquityIssuance { .. } => &["ret", "me"],
        }
    }

    /// Expression computing the formula, aliased to [`Self::output_name`].
    pub fn expr(&self, key: EntityKey) -> Expr {
        let expr = match *self {
            Self::NetStockIssuance => compustat::net_stock_issuance(col("csho"), col("ajex"), key),
            Self::TotalAccruals => compustat::total_accruals(
                col("act"),
                col("che"),
                col("lct"),
                col("dlc"),
                col("txp"),
                col("dp"),
                col("at"),
                key,
            ),
            Self::NetOperatingAssets => compustat::net_operating_assets(
                col("at"),
                col("che"),
                col("dlc"),
                col("dltt"),
                col("mib"),
                col("pstk"),
                col("ceq"),
                key,
            ),
            Self::GrossProfitability => compustat::gross_profitability(col("gp"), col("at")),
            Self::AssetGrowth => compustat::asset_growth(col("at"), key),
            Self::InvestmentToAssets => {
                compustat::investment_to_assets(col("ppegt"), col("invt"), col("at"), key)
            }
            Self::ReturnOnAssets => compustat::return_on_assets(col("ib"), col("at")),
            Self::ReturnOnAssetsQuarterly => {
                compustat::return_on_assets_quarterly(col("ibq"), col("atq"), key)
            }
            Self::OScore => compustat::o_score(OScoreInputs::from_columns(), key),
            Self::Momentum { periods } => crsp::momentum(col("ret"), periods, key),
            Self::CompositeEquityIssuance { periods } => {
                crsp::composite_equity_issuance(col("ret"), col("me"), periods, key)
            }
        };
        expr.alias(self.output_name())
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Momentum { periods: 0 } | Self::CompositeEquityIssuance { periods: 0 } => {
                Err(PanelError::InvalidParameter {
                    formula: self.output_name(),
                    reason: "window must span at least one period".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Evaluate `formulas` over `panel`, grouping lags by `key`.
///
/// The panel is sorted by entity and effective date first so that lags walk
/// each entity's history in time order. An empty panel or an empty formula
/// list is returned as is.
pub fn derive_panel(panel: DataFrame, key: EntityKey, formulas: &[Formula]) -> Result<DataFrame> {
    if formulas.is_empty() || panel.height() == 0 {
        return Ok(panel);
    }

    for formula in formulas {
        formula.validate()?;
        let needed = formula
            .required_columns()
            .iter()
            .copied()
            .chain([key.column(), DATE_COLUMN]);
        for column in needed {
            if panel.column(column).is_err() {
                return Err(PanelError::MissingColumn {
                    formula: formula.output_name(),
                    column: column.to_string(),
                });
            }
        }
    }

    let exprs: Vec<Expr> = formulas.iter().map(|f| f.expr(key)).collect();
    tracing::debug!(
        key = %key,
        formulas = formulas.len(),
        rows = panel.height(),
        "deriving panel columns"
    );

    let derived = panel
        .lazy()
        .sort([key.column(), DATE_COLUMN], Default::default())
        .with_columns(exprs)
        .collect()?;

    Ok(derived)
}
