//! The query engine (C6): the handful of read operations exposed to the
//! CLI and, eventually, to other embedders. Each operation returns its
//! result plus whatever `Warning`s it picked up along the way (missing
//! partitions, ambiguous terms resolved by convention), rather than
//! failing outright when a degraded answer is still useful.
use std::fmt::Write as _;

use crate::edit::Suggestion;
use crate::error::{Error, Result, Warning};
use crate::fileset::FileSet;
use crate::name_kind::NameKind;
use crate::schema::FileIdentity;
use crate::taxonomy::{FamilyFilters, ResolveAmbiguity, TaxonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageFormat {
    Pretty,
    Semicolon,
    Totals,
}

pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    fn new(value: T) -> Self {
        Outcome {
            value,
            warnings: Vec::new(),
        }
    }

    fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Outcome { value, warnings }
    }
}

/// `info`: the file set's identity plus a couple of derived summary facts
/// (spec.md §4.6).
pub fn info(set: &FileSet) -> Outcome<FileIdentity> {
    Outcome::with_warnings(set.identity.clone(), set.warnings().to_vec())
}

/// Resolves `term` to a single taxon id, surfacing ambiguity or near-miss
/// suggestions the way spec.md §4.4/§4.6 describe.
pub fn resolve_one(set: &FileSet, term: &str) -> Result<TaxonId> {
    let result = set.taxonomy.resolve(term);
    match result.unambiguous() {
        Ok(id) => Ok(id),
        Err(ResolveAmbiguity::Ambiguous(ids)) => {
            let names: Vec<String> = ids
                .iter()
                .filter_map(|&id| set.taxonomy.display_name(id).ok())
                .collect();
            Err(Error::user_with_hint(
                format!("'{term}' is ambiguous"),
                format!("matches: {}", names.join(", ")),
            ))
        }
        Err(ResolveAmbiguity::NoMatch) => {
            let suggestions = set.taxonomy.suggest(term, 10);
            if suggestions.is_empty() {
                Err(Error::user(format!("no taxon matches '{term}'")))
            } else {
                Err(Error::user_with_hint(
                    format!("no taxon matches '{term}'"),
                    format_suggestions(&suggestions),
                ))
            }
        }
    }
}

fn format_suggestions(suggestions: &[Suggestion]) -> String {
    let names: Vec<&str> = suggestions.iter().map(|s| s.name.as_str()).collect();
    format!("did you mean: {}?", names.join(", "))
}

/// `names`: every name on record for a resolved term (spec.md §4.6).
pub fn names(set: &FileSet, term: &str) -> Result<Outcome<Vec<(NameKind, String)>>> {
    let id = resolve_one(set, term)?;
    let node = set.taxonomy.node(id)?;
    Ok(Outcome::new(node.names.clone()))
}

struct TreeNode {
    id: TaxonId,
    name: String,
    partition: u32,
    count: usize,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn line(&self) -> String {
        format!("{} {}({}) [{}]", self.id, self.name, self.partition, self.count)
    }

    fn sum_count(&self) -> usize {
        self.count + self.children.iter().map(TreeNode::sum_count).sum::<usize>()
    }

    fn partitions(&self, out: &mut std::collections::BTreeSet<u32>) {
        out.insert(self.partition);
        for child in &self.children {
            child.partitions(out);
        }
    }

    fn leaf_paths(&self, prefix: &[String], out: &mut Vec<String>) {
        let mut path = prefix.to_vec();
        path.push(self.name.clone());
        if self.children.is_empty() {
            out.push(path.join(";"));
        } else {
            for child in &self.children {
                child.leaf_paths(&path, out);
            }
        }
    }
}

fn build_node(
    set: &FileSet,
    id: TaxonId,
    filters: &FamilyFilters,
    with_descendants: bool,
    complete: bool,
    warnings: &mut Vec<Warning>,
) -> Result<TreeNode> {
    let count = set.count_families(id, filters).unwrap_or_else(|_| {
        warnings.push(Warning::new(format!("could not count families for taxon {id}")));
        0
    });
    let mut children = Vec::new();
    if with_descendants {
        let child_ids = if complete {
            set.taxonomy.children_ids(id)?
        } else {
            set.taxonomy.value_children_ids(id)?
        };
        for child_id in child_ids {
            children.push(build_node(set, child_id, filters, with_descendants, complete, warnings)?);
        }
    }
    Ok(TreeNode {
        id,
        name: set.taxonomy.display_name(id)?,
        partition: set.taxonomy.partition_of(id)?,
        count,
        children,
    })
}

/// `lineage`: resolves `term` to a single taxon, then builds the
/// ancestor chain and/or descendant subtree the `-a`/`-d`/`-k` flags ask
/// for, rendered per `format` (spec.md §4.6).
#[allow(clippy::too_many_arguments)]
pub fn lineage(
    set: &FileSet,
    term: &str,
    with_ancestors: bool,
    with_descendants: bool,
    complete: bool,
    format: LineageFormat,
    filters: &FamilyFilters,
) -> Result<Outcome<String>> {
    let id = resolve_one(set, term)?;
    // `semicolon` always expands to the full root-to-leaf path with every
    // intermediate node (spec.md §4.6).
    let (with_ancestors, with_descendants, complete) = if format == LineageFormat::Semicolon {
        (true, true, true)
    } else {
        (with_ancestors, with_descendants, complete)
    };

    let mut warnings = Vec::new();
    let mut ancestors = if with_ancestors {
        if complete {
            set.taxonomy.ancestors(id)?
        } else {
            set.taxonomy.value_ancestors(id)?
        }
    } else {
        Vec::new()
    };
    ancestors.reverse();

    let target = build_node(set, id, filters, with_descendants, complete, &mut warnings)?;

    let rendered = match format {
        LineageFormat::Pretty => render_pretty(set, &ancestors, &target, filters, &mut warnings)?,
        LineageFormat::Semicolon => render_semicolon(set, &ancestors, &target, filters, &mut warnings)?,
        LineageFormat::Totals => render_totals(set, &ancestors, &target, filters, &mut warnings)?,
    };
    Ok(Outcome::with_warnings(rendered, warnings))
}

fn ancestor_nodes(
    set: &FileSet,
    ancestors: &[TaxonId],
    filters: &FamilyFilters,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<TreeNode>> {
    ancestors
        .iter()
        .map(|&a| {
            let count = set.count_families(a, filters).unwrap_or_else(|_| {
                warnings.push(Warning::new(format!("could not count families for taxon {a}")));
                0
            });
            Ok(TreeNode {
                id: a,
                name: set.taxonomy.display_name(a)?,
                partition: set.taxonomy.partition_of(a)?,
                count,
                children: Vec::new(),
            })
        })
        .collect()
}

fn render_pretty(
    set: &FileSet,
    ancestors: &[TaxonId],
    target: &TreeNode,
    filters: &FamilyFilters,
    warnings: &mut Vec<Warning>,
) -> Result<String> {
    let chain = ancestor_nodes(set, ancestors, filters, warnings)?;
    let mut out = String::new();
    for (depth, node) in chain.iter().enumerate() {
        if depth > 0 {
            out.push_str(&"  ".repeat(depth - 1));
            out.push_str("`-");
        }
        let _ = writeln!(out, "{}", node.line());
    }
    let depth = chain.len();
    render_node_pretty(target, depth, &mut out);
    Ok(out)
}

fn render_node_pretty(node: &TreeNode, depth: usize, out: &mut String) {
    if depth > 0 {
        out.push_str(&"  ".repeat(depth.saturating_sub(1)));
        out.push_str("`-");
    }
    let _ = writeln!(out, "{}", node.line());
    for child in &node.children {
        render_node_pretty(child, depth + 1, out);
    }
}

fn render_semicolon(
    set: &FileSet,
    ancestors: &[TaxonId],
    target: &TreeNode,
    filters: &FamilyFilters,
    warnings: &mut Vec<Warning>,
) -> Result<String> {
    let chain = ancestor_nodes(set, ancestors, filters, warnings)?;
    let prefix: Vec<String> = chain.iter().map(|n| n.name.clone()).collect();
    let mut leaves = Vec::new();
    target.leaf_paths(&prefix, &mut leaves);
    Ok(leaves.join("\n"))
}

fn render_totals(
    set: &FileSet,
    ancestors: &[TaxonId],
    target: &TreeNode,
    filters: &FamilyFilters,
    warnings: &mut Vec<Warning>,
) -> Result<String> {
    let chain = ancestor_nodes(set, ancestors, filters, warnings)?;
    let ancestral: usize = chain.iter().map(|n| n.count).sum();
    let lineage_specific = target.sum_count();
    let mut partitions = std::collections::BTreeSet::new();
    for node in &chain {
        partitions.insert(node.partition);
    }
    target.partitions(&mut partitions);
    let partition_list: Vec<String> = partitions.into_iter().map(|p| p.to_string()).collect();
    Ok(format!(
        "{ancestral} entries in ancestors; {lineage_specific} lineage-specific entries; found in partitions: {};",
        partition_list.join(",")
    ))
}

/// `family`: a single decoded record by accession or by unambiguous term
/// (spec.md §4.6).
pub fn family(set: &FileSet, accession: &str) -> Result<Outcome<crate::family::Family>> {
    Ok(Outcome::new(set.get_family(accession)?))
}

#[derive(Debug, Clone, Copy)]
pub enum FamilySearch {
    /// Families owned directly by this taxon only.
    ExactTaxon(TaxonId),
    /// This taxon plus its value-ancestors, value-descendants, or both,
    /// independently, per the `-a`/`-d` flags actually passed (spec.md
    /// §4.6, §8's "union of ancestors, descendants, and the term itself"
    /// testable property).
    Expanded {
        id: TaxonId,
        with_ancestors: bool,
        with_descendants: bool,
    },
}

/// `families`: the filtered, sorted, deduplicated family listing behind
/// `famdb families` (spec.md §4.6). Filters are applied in the fixed
/// order spec.md settles on: curated/uncurated, name prefix, class
/// prefix, stage, general-threshold requirement.
pub fn families(
    set: &FileSet,
    search: FamilySearch,
    filters: &FamilyFilters,
) -> Result<Outcome<Vec<crate::family::Family>>> {
    let (mut results, warnings) = match search {
        FamilySearch::ExactTaxon(id) => set.iter_families_for_taxon(id, filters)?,
        FamilySearch::Expanded {
            id,
            with_ancestors,
            with_descendants,
        } => {
            let mut ids = vec![id];
            if with_ancestors {
                ids.extend(set.taxonomy.value_ancestors(id)?);
            }
            if with_descendants {
                ids.extend(set.taxonomy.value_descendants(id)?);
            }
            set.families_for_taxa(&ids, filters)?
        }
    };
    results.sort_by(|a, b| a.accession.unversioned().cmp(&b.accession.unversioned()));
    results.dedup_by(|a, b| a.accession.unversioned() == b.accession.unversioned());
    Ok(Outcome::with_warnings(results, warnings))
}
