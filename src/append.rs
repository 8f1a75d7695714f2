//! The write path behind `famdb append` (SPEC_FULL.md §C): ingest a single
//! family from an EMBL record into the root file, inside one change-history
//! entry. No merge, no batching beyond one record per call — the exclusion
//! list and multi-record ingestion the upstream tool supports are out of
//! scope (spec.md doesn't name them as a required surface).
use std::path::Path;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::family::{self, Accession, BufferStage, Citation, Family, RepeatMaskerAnnotations};
use crate::schema;

struct ParsedEmbl {
    accession: Accession,
    name: Option<String>,
    description: Option<String>,
    classification: String,
    consensus: String,
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag).map(|rest| rest.trim())
}

fn parse_embl(text: &str) -> Result<ParsedEmbl> {
    let mut accession = None;
    let mut name = None;
    let mut description: Option<String> = None;
    let mut classification = String::new();
    let mut consensus = String::new();
    let mut in_sequence = false;

    for line in text.lines() {
        if let Some(rest) = strip_tag(line, "AC") {
            let acc_str = rest.trim_end_matches(';').trim();
            accession = Some(family::parse_accession(acc_str)?);
        } else if let Some(rest) = strip_tag(line, "NM") {
            name = Some(rest.to_string());
        } else if let Some(rest) = strip_tag(line, "DE") {
            let entry = description.get_or_insert_with(String::new);
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(rest);
        } else if let Some(rest) = strip_tag(line, "OC") {
            if classification.is_empty() {
                let trimmed = rest.trim_end_matches(';').trim();
                classification = if trimmed.starts_with("root") {
                    trimmed.to_string()
                } else {
                    format!("root;{trimmed}")
                };
            }
        } else if line.starts_with("SQ") {
            in_sequence = true;
        } else if line.trim() == "//" {
            in_sequence = false;
        } else if in_sequence {
            for token in line.split_whitespace() {
                if token.chars().all(|c| c.is_ascii_alphabetic()) {
                    consensus.push_str(token);
                }
            }
        }
    }

    let accession = accession.ok_or_else(|| Error::user("EMBL record has no AC line"))?;
    if classification.is_empty() {
        classification = "root".to_string();
    }

    Ok(ParsedEmbl {
        accession,
        name,
        description,
        classification,
        consensus: family::canonicalize_sequence(&consensus),
    })
}

/// Ingests one EMBL record from `path` into `container`, inside a single
/// change-history entry (spec.md §4.2 lifecycle). `timestamp` drives the
/// history entry's key and should be monotonically increasing per file.
pub fn append(
    container: &Container,
    path: &Path,
    name_override: Option<&str>,
    description_override: Option<&str>,
    timestamp: impl Into<String>,
) -> Result<Accession> {
    let text = std::fs::read_to_string(path)?;
    let parsed = parse_embl(&text)?;

    let family = Family {
        accession: parsed.accession.clone(),
        name: name_override.map(str::to_string).or(parsed.name),
        alt_names: Vec::new(),
        description: description_override.map(str::to_string).or(parsed.description),
        classification: parsed.classification,
        clades: Vec::new(),
        consensus: Some(parsed.consensus).filter(|s| !s.is_empty()),
        hmm: None,
        citations: Vec::<Citation>::new(),
        date_created: None,
        date_modified: None,
        length: None,
        rm: RepeatMaskerAnnotations {
            rm_type: None,
            subtype: None,
            search_stages: Vec::new(),
            buffer_stages: Vec::<BufferStage>::new(),
        },
        target_site_cons: None,
        refineable: true,
        extra: Default::default(),
    };

    let guard = schema::begin_write(container, timestamp, "append")?;
    let group_path = family::group_path_for(&family.accession);
    let node = container.root().ensure_group(&group_path)?;
    family::encode(&node, &family)?;
    guard.commit()?;
    Ok(family.accession)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_embl_record() {
        let text = "ID   DF000000099; SV 1; linear; DNA; STD; UNC; 20 BP.\n\
                     AC   DF000000099;\n\
                     DE   A test family\n\
                     OC   root; Metazoa\n\
                     SQ   Sequence 20 BP;\n\
                     acgtacgtacgtacgtacgt        20\n\
                     //\n";
        let parsed = parse_embl(text).unwrap();
        assert_eq!(parsed.accession.unversioned(), "DF000000099");
        assert_eq!(parsed.description.as_deref(), Some("A test family"));
        assert_eq!(parsed.consensus, "ACGTACGTACGTACGTACGT");
        assert_eq!(parsed.classification, "root; Metazoa");
    }
}
