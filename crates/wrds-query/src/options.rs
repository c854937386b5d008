//! Dataset options.
//!
//! Each dataset takes its own option struct. Unknown keys are rejected when
//! options are read from JSON, and every field has the default the research
//! code has always used.

use crate::error::{QueryError, Result};
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use wrds_panel::Formula;

fn crsp_start() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1925, 12, 31)
}

/// Options for the Compustat annual fundamentals dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FundaOptions {
    /// Book equity computed in the query
    pub be: bool,
    /// Compustat market equity, `csho * prcc_f`
    pub me_comp: bool,
    /// Net stock issuance
    pub nsi: bool,
    /// Total accruals
    pub tac: bool,
    /// Net operating assets
    pub noa: bool,
    /// Gross profitability
    pub gp: bool,
    /// Asset growth
    pub ag: bool,
    /// Investment-to-assets
    pub ia: bool,
    /// Return on assets
    pub roa: bool,
    /// Ohlson's O-Score
    pub oscore: bool,
    /// Link `lpermno`/`lpermco` from the CCM link table
    pub permno: bool,
    /// Select every column of the table
    pub all_vars: bool,
    /// Row limit
    pub limit: Option<u64>,
    /// First `datadate` to include
    pub start_date: Option<NaiveDate>,
    /// Last `datadate` to include
    pub end_date: Option<NaiveDate>,
    /// Months until accounting data becomes public
    pub delay_months: u32,
}

impl Default for FundaOptions {
    fn default() -> Self {
        Self {
            be: true,
            me_comp: false,
            nsi: false,
            tac: false,
            noa: false,
            gp: false,
            ag: false,
            ia: false,
            roa: false,
            oscore: false,
            permno: true,
            all_vars: false,
            limit: None,
            start_date: None,
            end_date: None,
            delay_months: 6,
        }
    }
}

impl FundaOptions {
    /// Formulas enabled by the options, in a fixed order.
    pub fn formulas(&self) -> Vec<Formula> {
        [
            (self.nsi, Formula::NetStockIssuance),
            (self.tac, Formula::TotalAccruals),
            (self.noa, Formula::NetOperatingAssets),
            (self.gp, Formula::GrossProfitability),
            (self.ag, Formula::AssetGrowth),
            (self.ia, Formula::InvestmentToAssets),
            (self.roa, Formula::ReturnOnAssets),
            (self.oscore, Formula::OScore),
        ]
        .into_iter()
        .filter_map(|(enabled, formula)| enabled.then_some(formula))
        .collect()
    }
}

/// Options for the Compustat quarterly fundamentals dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FundqOptions {
    /// Quarterly return on assets
    pub roa: bool,
    /// Inputs of the Campbell, Hilscher and Szilagyi distress probability
    pub chsdp: bool,
    /// Link `lpermno`/`lpermco` from the CCM link table
    pub permno: bool,
    /// Select every column of the table
    pub all_vars: bool,
    /// Row limit
    pub limit: Option<u64>,
    /// First `datadate` to include
    pub start_date: Option<NaiveDate>,
    /// Last `datadate` to include
    pub end_date: Option<NaiveDate>,
    /// Months until accounting data becomes public
    pub delay_months: u32,
}

impl Default for FundqOptions {
    fn default() -> Self {
        Self {
            roa: true,
            chsdp: false,
            permno: true,
            all_vars: false,
            limit: None,
            start_date: None,
            end_date: None,
            delay_months: 3,
        }
    }
}

impl FundqOptions {
    /// Formulas enabled by the options.
    pub fn formulas(&self) -> Vec<Formula> {
        if self.roa {
            vec![Formula::ReturnOnAssetsQuarterly]
        } else {
            Vec::new()
        }
    }
}

/// CRSP security file frequency.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Monthly stock file
    #[default]
    #[display("msf")]
    #[serde(rename = "msf")]
    Monthly,
    /// Daily stock file
    #[display("dsf")]
    #[serde(rename = "dsf")]
    Daily,
}

impl Frequency {
    /// Source table of the frequency.
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Monthly => "msf",
            Self::Daily => "dsf",
        }
    }
}

/// Options for the CRSP security datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrspOptions {
    /// Monthly or daily file, chosen by dataset name
    #[serde(skip)]
    pub frequency: Frequency,
    /// Compute delisting-adjusted returns (`ret_adj`)
    pub delist: bool,
    /// Month anchoring the annual value weights; `None` disables weighting
    pub vwm: Option<u32>,
    /// First date to include
    pub start_date: Option<NaiveDate>,
    /// Last date to include
    pub end_date: Option<NaiveDate>,
    /// Row limit
    pub limit: Option<u64>,
    /// Select every column of the security file
    pub all_vars: bool,
    /// Momentum window in periods
    pub momentum: Option<usize>,
    /// Composite equity issuance window in periods
    pub cei: Option<usize>,
}

impl Default for CrspOptions {
    fn default() -> Self {
        Self {
            frequency: Frequency::Monthly,
            delist: true,
            vwm: Some(6),
            start_date: crsp_start(),
            end_date: None,
            limit: None,
            all_vars: false,
            momentum: None,
            cei: None,
        }
    }
}

impl CrspOptions {
    /// Defaults for the daily file, which carries no value weights.
    pub fn daily() -> Self {
        Self {
            frequency: Frequency::Daily,
            vwm: None,
            ..Self::default()
        }
    }

    /// Check option values and combinations.
    pub fn validate(&self) -> Result<()> {
        for (name, window) in [("momentum", self.momentum), ("cei", self.cei)] {
            if window == Some(0) {
                return Err(QueryError::InvalidOption(format!(
                    "{name} window must span at least one period"
                )));
            }
        }
        if let Some(month) = self.vwm {
            if !(1..=12).contains(&month) {
                return Err(QueryError::InvalidOption(format!(
                    "vwm must be a month between 1 and 12, got {month}"
                )));
            }
            if self.frequency == Frequency::Daily {
                return Err(QueryError::Unsupported(
                    "value weighting is only available for the monthly file".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Formulas enabled by the options.
    pub fn formulas(&self) -> Vec<Formula> {
        let mut formulas = Vec::new();
        if let Some(periods) = self.momentum {
            formulas.push(Formula::Momentum { periods });
        }
        if let Some(periods) = self.cei {
            formulas.push(Formula::CompositeEquityIssuance { periods });
        }
        formulas
    }
}

/// Options for the CCM name-history dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamesOptions {
    /// Earliest first name date to include
    pub start_date: Option<NaiveDate>,
    /// Latest last name date to include
    pub end_date: Option<NaiveDate>,
    /// Row limit
    pub limit: Option<u64>,
}

impl Default for NamesOptions {
    fn default() -> Self {
        Self {
            start_date: crsp_start(),
            end_date: None,
            limit: None,
        }
    }
}

/// Options for the I/B/E/S guidance dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuidanceOptions {
    /// First announcement date to include
    pub start_date: Option<NaiveDate>,
    /// Last announcement date to include
    pub end_date: Option<NaiveDate>,
    /// Row limit
    pub limit: Option<u64>,
    /// Select every column of the table
    pub all_vars: bool,
}

impl Default for GuidanceOptions {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(1994, 12, 31),
            end_date: None,
            limit: None,
            all_vars: false,
        }
    }
}

/// Datasets the library can build queries for.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Compustat annual fundamentals
    #[display("funda")]
    Funda,
    /// Compustat quarterly fundamentals
    #[display("fundq")]
    Fundq,
    /// CRSP monthly stock file
    #[display("msf")]
    Msf,
    /// CRSP daily stock file
    #[display("dsf")]
    Dsf,
    /// CRSP/Compustat merged name history
    #[display("ccmnames")]
    CcmNames,
    /// I/B/E/S management guidance
    #[display("guidance")]
    Guidance,
}

impl DatasetKind {
    /// Every dataset, in documentation order.
    pub const ALL: [Self; 6] = [
        Self::Funda,
        Self::Fundq,
        Self::Msf,
        Self::Dsf,
        Self::CcmNames,
        Self::Guidance,
    ];
}

impl FromStr for DatasetKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| QueryError::UnknownDataset(s.to_string()))
    }
}

/// Options of any dataset, tagged by the dataset they configure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetOptions {
    /// Compustat annual
    Funda(FundaOptions),
    /// Compustat quarterly
    Fundq(FundqOptions),
    /// CRSP monthly or daily
    Crsp(CrspOptions),
    /// CCM name history
    Names(NamesOptions),
    /// I/B/E/S guidance
    Guidance(GuidanceOptions),
}

impl DatasetOptions {
    /// Default options for a dataset.
    pub fn defaults(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Funda => Self::Funda(FundaOptions::default()),
            DatasetKind::Fundq => Self::Fundq(FundqOptions::default()),
            DatasetKind::Msf => Self::Crsp(CrspOptions::default()),
            DatasetKind::Dsf => Self::Crsp(CrspOptions::daily()),
            DatasetKind::CcmNames => Self::Names(NamesOptions::default()),
            DatasetKind::Guidance => Self::Guidance(GuidanceOptions::default()),
        }
    }

    /// Read options for the dataset called `name` from a JSON object.
    ///
    /// Absent keys take their defaults; unknown keys are an error.
    pub fn from_json(name: &str, value: serde_json::Value) -> Result<Self> {
        let kind: DatasetKind = name.parse()?;
        let options = match kind {
            DatasetKind::Funda => Self::Funda(serde_json::from_value(value)?),
            DatasetKind::Fundq => Self::Fundq(serde_json::from_value(value)?),
            DatasetKind::Msf => Self::Crsp(serde_json::from_value(value)?),
            DatasetKind::Dsf => {
                let mut value = value;
                if let Some(map) = value.as_object_mut() {
                    map.entry("vwm").or_insert(serde_json::Value::Null);
                }
                let options: CrspOptions = serde_json::from_value(value)?;
                Self::Crsp(CrspOptions {
                    frequency: Frequency::Daily,
                    ..options
                })
            }
            DatasetKind::CcmNames => Self::Names(serde_json::from_value(value)?),
            DatasetKind::Guidance => Self::Guidance(serde_json::from_value(value)?),
        };
        Ok(options)
    }
}
