//! The closed set of name classes a taxon's name list can carry (spec.md
//! §3 "Taxon node"). Kept as a dedicated type, rather than a bare string,
//! so the taxonomy index can pick out the scientific/common names it needs
//! for display and lineage rendering without re-parsing strings everywhere.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameKind {
    Scientific,
    Common,
    GenbankCommon,
    Synonym,
    Authority,
    Includes,
    Equivalent,
    /// Any name class the NCBI dump uses that we don't special-case
    /// (e.g. "blast name", "type material", "misspelling").
    Other(String),
}

impl NameKind {
    /// True for the two kinds `display_name` (spec.md §4.6 `lineage`
    /// pretty format) prefers, in preference order.
    pub fn is_scientific(&self) -> bool {
        matches!(self, NameKind::Scientific)
    }

    pub fn is_common(&self) -> bool {
        matches!(self, NameKind::Common | NameKind::GenbankCommon)
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Scientific => write!(f, "scientific name"),
            NameKind::Common => write!(f, "common name"),
            NameKind::GenbankCommon => write!(f, "genbank common name"),
            NameKind::Synonym => write!(f, "synonym"),
            NameKind::Authority => write!(f, "authority"),
            NameKind::Includes => write!(f, "includes"),
            NameKind::Equivalent => write!(f, "equivalent name"),
            NameKind::Other(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for NameKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "scientific name" => NameKind::Scientific,
            "common name" => NameKind::Common,
            "genbank common name" => NameKind::GenbankCommon,
            "synonym" => NameKind::Synonym,
            "authority" => NameKind::Authority,
            "includes" => NameKind::Includes,
            "equivalent name" => NameKind::Equivalent,
            other => NameKind::Other(other.to_string()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_known_kinds() {
        for kind in [
            NameKind::Scientific,
            NameKind::Common,
            NameKind::GenbankCommon,
            NameKind::Synonym,
            NameKind::Authority,
            NameKind::Includes,
            NameKind::Equivalent,
        ] {
            let s = kind.to_string();
            assert_eq!(NameKind::from_str(&s).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_preserved() {
        let kind = NameKind::from_str("blast name").unwrap();
        assert_eq!(kind, NameKind::Other("blast name".to_string()));
    }
}
