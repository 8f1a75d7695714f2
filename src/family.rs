//! In-memory family record and its container codec (C3). A family is
//! decoded lazily, one call at a time — spec.md §5 is explicit that the
//! working set is usually larger than RAM, so nothing here caches records
//! across calls.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::Node;
use crate::error::{Error, Result};
use crate::schema;

/// An accession's parsed structure: `DF000001068.3` -> curated, digits
/// `000001068`, version `Some(3)` (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accession {
    pub curated: bool,
    pub digits: String,
    pub version: Option<u32>,
}

impl Accession {
    /// The accession without its version suffix, e.g. `DF000001068`.
    pub fn unversioned(&self) -> String {
        format!("{}{}", if self.curated { "DF" } else { "DR" }, self.digits)
    }
}

impl std::fmt::Display for Accession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unversioned())?;
        if let Some(v) = self.version {
            write!(f, ".{v}")?;
        }
        Ok(())
    }
}

pub fn parse_accession(s: &str) -> Result<Accession> {
    let s = s.trim();
    let upper: String = s.to_ascii_uppercase();
    let curated = if upper.starts_with("DF") {
        true
    } else if upper.starts_with("DR") {
        false
    } else {
        return Err(Error::user_with_hint(
            format!("'{s}' is not a valid accession"),
            "accessions start with DF (curated) or DR (uncurated)",
        ));
    };

    let rest = &s[2..];
    let (digits_part, version_part) = match rest.split_once('.') {
        Some((d, v)) => (d, Some(v)),
        None => (rest, None),
    };

    if digits_part.is_empty() || !digits_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::user(format!(
            "'{s}' is not a valid accession: expected digits after the DF/DR prefix"
        )));
    }

    let version = match version_part {
        Some(v) => Some(v.parse::<u32>().map_err(|_| {
            Error::user(format!("'{s}' has an invalid version suffix"))
        })?),
        None => None,
    };

    Ok(Accession {
        curated,
        digits: digits_part.to_string(),
        version,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesThreshold {
    pub taxon_id: u32,
    pub taxon_name: String,
    pub ga: f64,
    pub tc: f64,
    pub nc: f64,
    pub fdr: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralThreshold {
    pub ga: f64,
    pub tc: f64,
    pub nc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HmmModel {
    /// The stored HMMER-format payload, copied through byte-for-byte
    /// except where an emitter rewrites specific header lines (spec.md
    /// §4.7 `hmm`/`hmm_species`).
    pub raw: Vec<u8>,
    pub general_threshold: Option<GeneralThreshold>,
    pub species_thresholds: Vec<SpeciesThreshold>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BufferStage {
    pub stage: i32,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RepeatMaskerAnnotations {
    pub rm_type: Option<String>,
    pub subtype: Option<String>,
    pub search_stages: Vec<i32>,
    pub buffer_stages: Vec<BufferStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Citation {
    pub title: String,
    pub authors: String,
    pub journal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Family {
    pub accession: Accession,
    pub name: Option<String>,
    pub alt_names: Vec<String>,
    pub description: Option<String>,
    /// Semicolon-delimited, always beginning with `root` (spec.md §3).
    pub classification: String,
    pub clades: Vec<u32>,
    pub consensus: Option<String>,
    pub hmm: Option<HmmModel>,
    pub citations: Vec<Citation>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub length: Option<u64>,
    pub rm: RepeatMaskerAnnotations,
    pub target_site_cons: Option<String>,
    pub refineable: bool,
    /// Attributes this reader doesn't understand, preserved verbatim so a
    /// round-trip through `encode`/`decode` doesn't drop them.
    pub extra: BTreeMap<String, Value>,
}

impl Family {
    pub fn curated(&self) -> bool {
        self.accession.curated
    }

    pub fn has_general_threshold(&self) -> bool {
        self.hmm
            .as_ref()
            .is_some_and(|h| h.general_threshold.is_some())
    }
}

/// Upper-cases and strips whitespace from a raw sequence string, the
/// canonical on-disk form (spec.md §4.3: "Sequence strings are
/// case-insensitive on write (stored upper-case)").
pub fn canonicalize_sequence(seq: &str) -> String {
    seq.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_uppercase()
}

/// Wraps a sequence at `width` columns, the way FASTA/EMBL emission
/// requires (spec.md §4.3, §4.7).
pub fn wrap_sequence(seq: &str, width: usize) -> Vec<String> {
    seq.as_bytes()
        .chunks(width)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

const ATTR_META: &str = "meta";
const DATASET_CONSENSUS: &str = "consensus";
const DATASET_HMM: &str = "hmm";

/// The subset of `Family` that round-trips as a single JSON attribute,
/// leaving `consensus`/`hmm` as their own datasets (spec.md §4.2's group
/// layout: "Required per-family sub-datasets: consensus ..., hmm ...,
/// plus scalar attributes for the remaining fields").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FamilyMeta {
    version: Option<u32>,
    name: Option<String>,
    alt_names: Vec<String>,
    description: Option<String>,
    classification: String,
    clades: Vec<u32>,
    citations: Vec<Citation>,
    date_created: Option<String>,
    date_modified: Option<String>,
    length: Option<u64>,
    rm: RepeatMaskerAnnotations,
    target_site_cons: Option<String>,
    refineable: bool,
    general_threshold: Option<GeneralThreshold>,
    species_thresholds: Vec<SpeciesThreshold>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

pub fn decode(node: &Node, accession_str: &str) -> Result<Family> {
    let accession = parse_accession(accession_str)?;
    let meta: FamilyMeta = node
        .read_attr(ATTR_META)
        .map_err(|_| Error::data(format!("family {accession_str} is missing its metadata attribute")))?;

    let consensus = if node.group_exists(DATASET_CONSENSUS) || node_has_dataset(node, DATASET_CONSENSUS) {
        Some(canonicalize_sequence(&node.read_dataset_string(DATASET_CONSENSUS)?))
    } else {
        None
    };

    let hmm = if node_has_dataset(node, DATASET_HMM) {
        Some(HmmModel {
            raw: node.read_dataset_bytes(DATASET_HMM)?,
            general_threshold: meta.general_threshold.clone(),
            species_thresholds: meta.species_thresholds.clone(),
        })
    } else {
        None
    };

    Ok(Family {
        accession,
        name: meta.name,
        alt_names: meta.alt_names,
        description: meta.description,
        classification: meta.classification,
        clades: meta.clades,
        consensus,
        hmm,
        citations: meta.citations,
        date_created: meta.date_created,
        date_modified: meta.date_modified,
        length: meta.length,
        rm: meta.rm,
        target_site_cons: meta.target_site_cons,
        refineable: meta.refineable,
        extra: meta.extra,
    })
}

fn node_has_dataset(node: &Node, name: &str) -> bool {
    node.children().map(|c| c.iter().any(|n| n == name)).unwrap_or(false)
}

pub fn encode(node: &Node, family: &Family) -> Result<()> {
    if !family.classification.starts_with("root") {
        return Err(Error::data(format!(
            "family {} has a classification not rooted at 'root'",
            family.accession
        )));
    }

    let meta = FamilyMeta {
        version: family.accession.version,
        name: family.name.clone(),
        alt_names: family.alt_names.clone(),
        description: family.description.clone(),
        classification: family.classification.clone(),
        clades: family.clades.clone(),
        citations: family.citations.clone(),
        date_created: family.date_created.clone(),
        date_modified: family.date_modified.clone(),
        length: family.length,
        rm: family.rm.clone(),
        target_site_cons: family.target_site_cons.clone(),
        refineable: family.refineable,
        general_threshold: family.hmm.as_ref().and_then(|h| h.general_threshold.clone()),
        species_thresholds: family
            .hmm
            .as_ref()
            .map(|h| h.species_thresholds.clone())
            .unwrap_or_default(),
        extra: family.extra.clone(),
    };
    node.write_attr(ATTR_META, &meta)?;

    if let Some(consensus) = &family.consensus {
        node.write_dataset_string(DATASET_CONSENSUS, &canonicalize_sequence(consensus))?;
    }
    if let Some(hmm) = &family.hmm {
        node.write_dataset_bytes(DATASET_HMM, &hmm.raw)?;
    }
    Ok(())
}

pub fn group_path_for(accession: &Accession) -> String {
    schema::family_group_path(&accession.unversioned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_curated_accession_with_version() {
        let a = parse_accession("DF000001068.3").unwrap();
        assert!(a.curated);
        assert_eq!(a.digits, "000001068");
        assert_eq!(a.version, Some(3));
        assert_eq!(a.to_string(), "DF000001068.3");
    }

    #[test]
    fn parses_uncurated_accession_without_version() {
        let a = parse_accession("dr000000042").unwrap();
        assert!(!a.curated);
        assert_eq!(a.version, None);
        assert_eq!(a.unversioned(), "DR000000042");
    }

    #[test]
    fn rejects_bad_prefix() {
        assert!(parse_accession("XX000000001").is_err());
    }

    #[test]
    fn rejects_non_digit_body() {
        assert!(parse_accession("DF00000ABCD").is_err());
    }

    #[test]
    fn sequence_canonicalization_upper_cases_and_strips_whitespace() {
        assert_eq!(canonicalize_sequence("acgt\nacgt "), "ACGTACGT");
    }

    #[test]
    fn wraps_at_width() {
        let wrapped = wrap_sequence("ACGTACGTAC", 4);
        assert_eq!(wrapped, vec!["ACGT", "ACGT", "AC"]);
    }

    #[test]
    fn bin_path_uses_unversioned_accession() {
        let a = parse_accession("DF000001068.3").unwrap();
        assert_eq!(group_path_for(&a), "Families/DF/DF000001068");
    }
}
