//! Formula Registry
//!
//! Central list of the derived fields the library can compute, with the base
//! columns each one needs and the identifier namespace it is grouped by.

use crate::{EntityKey, Formula};

/// Formula metadata
#[derive(Debug, Clone)]
pub struct FormulaInfo {
    /// Output column name (unique identifier)
    pub name: &'static str,
    /// Brief description of the ratio
    pub description: &'static str,
    /// Identifier namespace lags are grouped by
    pub entity: EntityKey,
    /// Base columns read by the formula
    pub required_columns: &'static [&'static str],
    /// The formula itself, with default parameters where it takes any
    pub formula: Formula,
}

const fn compustat(
    name: &'static str,
    description: &'static str,
    formula: Formula,
) -> FormulaInfo {
    FormulaInfo {
        name,
        description,
        entity: EntityKey::Gvkey,
        required_columns: formula.required_columns(),
        formula,
    }
}

/// Get all available formula info
pub fn available_formulas() -> Vec<FormulaInfo> {
    vec![
        compustat(
            "nsi",
            "Net stock issuance: diff(log(csho * ajex))",
            Formula::NetStockIssuance,
        ),
        compustat(
            "tac",
            "Total accruals scaled by average total assets",
            Formula::TotalAccruals,
        ),
        compustat(
            "noa",
            "Net operating assets scaled by lagged total assets",
            Formula::NetOperatingAssets,
        ),
        compustat(
            "gpa",
            "Gross profitability: gp / at",
            Formula::GrossProfitability,
        ),
        compustat("ag", "Asset growth: at / lag(at) - 1", Formula::AssetGrowth),
        compustat(
            "ia",
            "Investment-to-assets: (diff(ppegt) + diff(invt)) / lag(at)",
            Formula::InvestmentToAssets,
        ),
        compustat(
            "roa",
            "Annual return on assets: ib / at",
            Formula::ReturnOnAssets,
        ),
        compustat(
            "roaq",
            "Quarterly return on assets: ibq / lag(atq)",
            Formula::ReturnOnAssetsQuarterly,
        ),
        compustat("oscore", "Ohlson's O-Score (undeflated)", Formula::OScore),
        FormulaInfo {
            name: "mom",
            description: "Trailing compounded return, 11 months by default",
            entity: EntityKey::Permno,
            required_columns: Formula::Momentum { periods: 11 }.required_columns(),
            formula: Formula::Momentum { periods: 11 },
        },
        FormulaInfo {
            name: "cei",
            description: "Composite equity issuance, 60 months by default",
            entity: EntityKey::Permno,
            required_columns: Formula::CompositeEquityIssuance { periods: 60 }.required_columns(),
            formula: Formula::CompositeEquityIssuance { periods: 60 },
        },
    ]
}

/// Get formulas grouped by an identifier namespace
pub fn formulas_for_entity(entity: EntityKey) -> Vec<FormulaInfo> {
    available_formulas()
        .into_iter()
        .filter(|f| f.entity == entity)
        .collect()
}

/// Get formula info by name
pub fn get_formula_info(name: &str) -> Option<FormulaInfo> {
    available_formulas().into_iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let formulas = available_formulas();
        let names: HashSet<_> = formulas.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), formulas.len());
    }

    #[test]
    fn test_names_match_output_columns() {
        for info in formulas_for_entity(EntityKey::Gvkey) {
            assert_eq!(info.name, info.formula.output_name());
        }
    }

    #[test]
    fn test_lookup() {
        let info = get_formula_info("oscore").unwrap();
        assert_eq!(info.entity, EntityKey::Gvkey);
        assert!(info.required_columns.contains(&"act"));
        assert!(get_formula_info("chsdp").is_none());
    }

    #[test]
    fn test_crsp_formulas() {
        let crsp = formulas_for_entity(EntityKey::Permno);
        assert_eq!(crsp.len(), 2);
        assert!(crsp.iter().all(|f| f.required_columns.contains(&"ret")));
    }
}
