//! Entity identifier namespaces.
//!
//! Every grouped time-series operation runs inside one identifier namespace.
//! Compustat rows are grouped by `gvkey`, CRSP rows by `permno` and I/B/E/S
//! rows by the I/B/E/S ticker; mixing them inside one group is never valid.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifier namespace used to group panel rows.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKey {
    /// Compustat company key
    #[display("gvkey")]
    Gvkey,
    /// CRSP permanent security number
    #[display("permno")]
    Permno,
    /// I/B/E/S ticker
    #[display("ibesticker")]
    IbesTicker,
}

impl EntityKey {
    /// Column holding the identifier.
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Gvkey => "gvkey",
            Self::Permno => "permno",
            Self::IbesTicker => "ibesticker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_column() {
        for key in [EntityKey::Gvkey, EntityKey::Permno, EntityKey::IbesTicker] {
            assert_eq!(key.to_string(), key.column());
        }
    }
}
