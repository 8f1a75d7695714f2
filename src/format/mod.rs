//! Format emitters (C7): one `render` entry point per output format the
//! CLI's `-f` flag accepts. Every emitter shares the same context shape so
//! adding a format never touches the query engine (spec.md §4.7).
mod embl;
mod fasta;
mod hmm;
mod summary;

use crate::error::{Error, Result};
use crate::family::Family;
use crate::taxonomy::TaxonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Summary,
    FastaName,
    FastaAcc,
    Hmm,
    HmmSpecies,
    Embl,
    EmblMeta,
    EmblSeq,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "summary" => OutputFormat::Summary,
            "fasta_name" => OutputFormat::FastaName,
            "fasta_acc" => OutputFormat::FastaAcc,
            "hmm" => OutputFormat::Hmm,
            "hmm_species" => OutputFormat::HmmSpecies,
            "embl" => OutputFormat::Embl,
            "embl_meta" => OutputFormat::EmblMeta,
            "embl_seq" => OutputFormat::EmblSeq,
            other => {
                return Err(Error::user_with_hint(
                    format!("unknown output format '{other}'"),
                    "valid formats: summary, fasta_name, fasta_acc, hmm, hmm_species, embl, embl_meta, embl_seq",
                ))
            }
        })
    }
}

/// Everything an emitter needs beyond the family record itself. Built by
/// the caller (the query engine doesn't know about rendering; the CLI
/// doesn't know about taxonomy internals), so no emitter touches the
/// taxonomy index or file set directly.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Name of the taxon the query was made against, not the family's own
    /// clade (spec.md §4.7: "the display clade is the queried taxon").
    pub display_clade: String,
    pub reverse_complement: bool,
    pub include_class_in_name: bool,
    /// Scientific-name lineage from the queried family's clade up to
    /// root, nearest first, used for EMBL's `OC` line.
    pub lineage_names: Vec<String>,
    pub organism_name: String,
    /// The query species and its ancestors, nearest first, used to pick
    /// the best per-species HMM threshold.
    pub species_ancestor_chain: Vec<TaxonId>,
}

pub fn render(format: OutputFormat, family: &Family, ctx: &RenderContext) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Summary => Ok(summary::render(family, ctx).into_bytes()),
        OutputFormat::FastaName => fasta::render(family, ctx, fasta::HeaderStyle::Name),
        OutputFormat::FastaAcc => fasta::render(family, ctx, fasta::HeaderStyle::Accession),
        OutputFormat::Hmm => hmm::render(family, ctx, false),
        OutputFormat::HmmSpecies => hmm::render(family, ctx, true),
        OutputFormat::Embl => embl::render(family, ctx, embl::EmblMode::Full),
        OutputFormat::EmblMeta => embl::render(family, ctx, embl::EmblMode::MetaOnly),
        OutputFormat::EmblSeq => embl::render(family, ctx, embl::EmblMode::SeqOnly),
    }
}
