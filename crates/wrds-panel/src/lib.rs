#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/wrds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod entity;
pub mod error;
pub mod formulas;
pub mod registry;
pub mod temporal;

pub use entity::EntityKey;
pub use error::{PanelError, Result};
pub use formulas::{Formula, derive_panel};
pub use registry::{FormulaInfo, available_formulas, formulas_for_entity, get_formula_info};

/// Name of the effective-date column every panel is keyed on.
pub const DATE_COLUMN: &str = "date";
