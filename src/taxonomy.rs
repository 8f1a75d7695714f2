//! The taxonomy index (C4): an arena of taxon nodes addressed by internal
//! array position, with a `tax_id -> position` map layered on top the way
//! the teacher's `GeneralTaxonomy` layers a `tax_id_lookup` over parallel
//! arrays. `value_parent`/`value_children` are a second, derived set of
//! edges that skip taxa with no family anywhere in the file set (spec.md
//! §3, §9 open question: nearest data-bearing descendants).
use std::collections::{HashMap, HashSet, VecDeque};

use crate::edit::{self, Suggestion};
use crate::error::{Error, Result};
use crate::name_kind::NameKind;

pub type TaxonId = u32;
type Index = usize;

#[derive(Debug, Clone)]
pub struct TaxonNode {
    pub id: TaxonId,
    pub names: Vec<(NameKind, String)>,
    pub partition: u32,
    /// Family accessions owned by this node, present only when this index
    /// was built from the partition that owns the node (spec.md §3).
    pub family_accessions: Vec<String>,
}

/// A single family's filterable attributes, as far as counting and
/// `families` filtering need to see them — the full record lives in
/// `family::Family` and is loaded lazily by the file-set coordinator.
#[derive(Debug, Clone, Default)]
pub struct FamilyFacets {
    pub curated: bool,
    pub classification: String,
    pub name: Option<String>,
    pub search_stages: Vec<i32>,
    pub buffer_stages: Vec<i32>,
    pub has_general_threshold: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FamilyFilters<'a> {
    pub curated: Option<bool>,
    pub stage: Option<i32>,
    pub class_prefix: Option<&'a str>,
    pub name_prefix: Option<&'a str>,
    pub require_general_threshold: bool,
}

/// Does `classification` have `prefix` as a leading sequence of
/// semicolon-delimited components? `LTR` matches `root;LTR/ERVL` at the
/// component boundary, never as a substring inside a component like
/// `xLTR` (spec.md §4.6 `families`' class filter).
pub fn classification_matches_prefix(classification: &str, prefix: &str) -> bool {
    let comps: Vec<&str> = classification.split(';').collect();
    let prefix_comps: Vec<&str> = prefix.split(';').collect();
    if prefix_comps.len() > comps.len() {
        return false;
    }
    comps
        .iter()
        .zip(prefix_comps.iter())
        .all(|(c, p)| c == p || c.starts_with(&format!("{p}/")))
}

impl FamilyFacets {
    pub fn matches(&self, filters: &FamilyFilters) -> bool {
        if let Some(curated) = filters.curated {
            if self.curated != curated {
                return false;
            }
        }
        if let Some(prefix) = filters.name_prefix {
            match &self.name {
                Some(name) if name.to_lowercase().starts_with(&prefix.to_lowercase()) => {}
                _ => return false,
            }
        }
        if let Some(prefix) = filters.class_prefix {
            if !classification_matches_prefix(&self.classification, prefix) {
                return false;
            }
        }
        if let Some(stage) = filters.stage {
            if !self.search_stages.contains(&stage) && !self.buffer_stages.contains(&stage) {
                return false;
            }
        }
        if filters.require_general_threshold && !self.has_general_threshold {
            return false;
        }
        true
    }
}

pub struct TaxonomyIndex {
    nodes: Vec<TaxonNode>,
    parent: Vec<Option<Index>>,
    children: Vec<Vec<Index>>,
    value_parent: Vec<Index>,
    value_children: Vec<Vec<Index>>,
    id_to_index: HashMap<TaxonId, Index>,
    /// Eagerly loaded, normalized-name -> candidate ids (spec.md §5: "the
    /// name-to-ids map is eagerly loaded (small, hot)").
    name_to_ids: HashMap<String, Vec<TaxonId>>,
    root: Index,
}

/// Normalizes a search term the way spec.md §4.4 `resolve` requires:
/// lower-case, collapse internal whitespace, strip surrounding quotes.
/// Multi-word terms are expected to already be joined with single spaces
/// by the caller.
pub fn normalize_term(term: &str) -> String {
    let stripped = term.trim().trim_matches(|c| c == '"' || c == '\'');
    let mut out = String::with_capacity(stripped.len());
    let mut last_was_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c.to_ascii_lowercase());
            last_was_space = false;
        }
    }
    out
}

#[derive(Debug, Default, Clone)]
pub struct ResolveResult {
    pub exact: Vec<TaxonId>,
    pub partial: Vec<TaxonId>,
}

impl ResolveResult {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.partial.is_empty()
    }

    /// Tie-break order of spec.md §4.4: a single exact match wins; else a
    /// single partial match wins if there are no exact matches at all;
    /// anything else is ambiguous (or empty).
    pub fn unambiguous(&self) -> std::result::Result<TaxonId, ResolveAmbiguity> {
        if self.exact.len() == 1 {
            return Ok(self.exact[0]);
        }
        if self.exact.is_empty() && self.partial.len() == 1 {
            return Ok(self.partial[0]);
        }
        if self.is_empty() {
            Err(ResolveAmbiguity::NoMatch)
        } else {
            let mut candidates = self.exact.clone();
            candidates.extend(self.partial.iter().copied());
            Err(ResolveAmbiguity::Ambiguous(candidates))
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResolveAmbiguity {
    NoMatch,
    Ambiguous(Vec<TaxonId>),
}

impl TaxonomyIndex {
    /// Builds an index from the flat node list produced by the file-set
    /// coordinator while loading `/Taxonomy/Nodes` and `/Taxonomy/Names`.
    /// `parent_of` gives the raw tree edges; the value-edges are derived
    /// here (spec.md §3's "derived, collapsed projection").
    pub fn build(nodes: Vec<TaxonNode>, parent_of: HashMap<TaxonId, TaxonId>) -> Result<Self> {
        let mut id_to_index = HashMap::with_capacity(nodes.len());
        for (ix, n) in nodes.iter().enumerate() {
            id_to_index.insert(n.id, ix);
        }

        let root = *id_to_index
            .get(&1)
            .ok_or_else(|| Error::data("taxonomy is missing the root node (id 1)"))?;

        let mut parent = vec![None; nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        for (ix, node) in nodes.iter().enumerate() {
            if ix == root {
                continue;
            }
            let parent_id = *parent_of.get(&node.id).ok_or_else(|| {
                Error::data(format!("taxon {} has no recorded parent", node.id))
            })?;
            let parent_ix = *id_to_index.get(&parent_id).ok_or_else(|| {
                Error::data(format!(
                    "taxon {} references unknown parent {}",
                    node.id, parent_id
                ))
            })?;
            parent[ix] = Some(parent_ix);
            children[parent_ix].push(ix);
        }

        // Every node must terminate at root (spec.md §8 invariant).
        for ix in 0..nodes.len() {
            let mut cur = ix;
            let mut hops = 0;
            while let Some(p) = parent[cur] {
                cur = p;
                hops += 1;
                if hops > nodes.len() {
                    return Err(Error::data(format!(
                        "taxonomy has a cycle reaching taxon {}",
                        nodes[ix].id
                    )));
                }
            }
            if cur != root {
                return Err(Error::data(format!(
                    "taxon {} does not terminate at root",
                    nodes[ix].id
                )));
            }
        }

        let mut name_to_ids: HashMap<String, Vec<TaxonId>> = HashMap::new();
        for node in &nodes {
            for (_, name) in &node.names {
                name_to_ids
                    .entry(normalize_term(name))
                    .or_default()
                    .push(node.id);
            }
        }

        let (value_parent, value_children) = derive_value_edges(&nodes, &parent, &children, root);

        Ok(TaxonomyIndex {
            nodes,
            parent,
            children,
            value_parent,
            value_children,
            id_to_index,
            name_to_ids,
            root,
        })
    }

    fn index_of(&self, id: TaxonId) -> Result<Index> {
        self.id_to_index
            .get(&id)
            .copied()
            .ok_or_else(|| Error::data(format!("unknown taxon id {id}")))
    }

    pub fn root_id(&self) -> TaxonId {
        self.nodes[self.root].id
    }

    pub fn node(&self, id: TaxonId) -> Result<&TaxonNode> {
        Ok(&self.nodes[self.index_of(id)?])
    }

    pub fn partition_of(&self, id: TaxonId) -> Result<u32> {
        Ok(self.node(id)?.partition)
    }

    pub fn parent_id(&self, id: TaxonId) -> Result<Option<TaxonId>> {
        let ix = self.index_of(id)?;
        Ok(self.parent[ix].map(|p| self.nodes[p].id))
    }

    pub fn children_ids(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let ix = self.index_of(id)?;
        Ok(self.children[ix].iter().map(|&c| self.nodes[c].id).collect())
    }

    pub fn ancestors(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let mut ix = self.index_of(id)?;
        let mut out = Vec::new();
        while let Some(p) = self.parent[ix] {
            out.push(self.nodes[p].id);
            ix = p;
        }
        Ok(out)
    }

    pub fn descendants(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let root_ix = self.index_of(id)?;
        let mut out = Vec::new();
        let mut stack = vec![root_ix];
        while let Some(ix) = stack.pop() {
            for &child in &self.children[ix] {
                out.push(self.nodes[child].id);
                stack.push(child);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    pub fn value_ancestors(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let mut ix = self.index_of(id)?;
        let mut out = Vec::new();
        // Walk the raw ancestor chain rather than `value_parent`: `id`
        // itself may be data-bearing, in which case `value_parent[id] ==
        // id` and starting the walk there would stop before climbing past
        // `id` at all. Checking each ancestor's own family list directly
        // sidesteps that self-reference.
        while let Some(p) = self.parent[ix] {
            if !self.nodes[p].family_accessions.is_empty() {
                out.push(self.nodes[p].id);
            }
            ix = p;
        }
        Ok(out)
    }

    /// The nearest data-bearing children directly below `id` in the
    /// value-edge projection (not the full transitive closure — see
    /// [`TaxonomyIndex::value_descendants`] for that).
    pub fn value_children_ids(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let ix = self.index_of(id)?;
        Ok(self.value_children[ix].iter().map(|&c| self.nodes[c].id).collect())
    }

    pub fn value_descendants(&self, id: TaxonId) -> Result<Vec<TaxonId>> {
        let ix = self.index_of(id)?;
        let mut stack: Vec<Index> = self.value_children[ix].clone();
        let mut seen: HashSet<Index> = stack.iter().copied().collect();
        let mut all = Vec::new();
        while let Some(cur) = stack.pop() {
            all.push(self.nodes[cur].id);
            for &next in &self.value_children[cur] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        all.sort_unstable();
        all.dedup();
        Ok(all)
    }

    /// Resolves a term to exact/partial matching taxon ids (spec.md §4.4).
    /// Numeric terms match by id directly (exact only); string terms match
    /// against every name variant of every taxon.
    pub fn resolve(&self, term: &str) -> ResolveResult {
        if let Ok(id) = term.trim().parse::<TaxonId>() {
            if self.id_to_index.contains_key(&id) {
                return ResolveResult {
                    exact: vec![id],
                    partial: Vec::new(),
                };
            }
            return ResolveResult::default();
        }

        let normalized = normalize_term(term);
        let mut exact: Vec<TaxonId> = self
            .name_to_ids
            .get(&normalized)
            .cloned()
            .unwrap_or_default();
        exact.sort_unstable();
        exact.dedup();

        let mut partial = Vec::new();
        if !normalized.is_empty() {
            for node in &self.nodes {
                if exact.contains(&node.id) {
                    continue;
                }
                if node
                    .names
                    .iter()
                    .any(|(_, name)| normalize_term(name).contains(&normalized))
                {
                    partial.push(node.id);
                }
            }
        }
        partial.sort_unstable();
        partial.dedup();

        ResolveResult { exact, partial }
    }

    /// Up to `limit` name suggestions within edit distance of `term`,
    /// intended to be called only when `resolve` comes back empty.
    pub fn suggest(&self, term: &str, limit: usize) -> Vec<Suggestion> {
        let normalized = normalize_term(term);
        // Compare against normalized names too, the same way `resolve`
        // does, so a name differing from the query only by case isn't
        // charged a spurious per-letter edit distance.
        let normalized_candidates: Vec<(u32, String)> = self
            .nodes
            .iter()
            .flat_map(|n| n.names.iter().map(move |(_, name)| (n.id, normalize_term(name))))
            .collect();
        let candidates = normalized_candidates.iter().map(|(id, name)| (*id, name.as_str()));
        edit::suggest(&normalized, candidates, limit)
    }

    /// Preferred display name for a taxon: first scientific name, else
    /// first common name, else the taxon id as a string (spec.md §4.6).
    pub fn display_name(&self, id: TaxonId) -> Result<String> {
        let node = self.node(id)?;
        if let Some((_, name)) = node.names.iter().find(|(k, _)| k.is_scientific()) {
            return Ok(name.clone());
        }
        if let Some((_, name)) = node.names.iter().find(|(k, _)| k.is_common()) {
            return Ok(name.clone());
        }
        Ok(id.to_string())
    }

    pub fn count_families(
        &self,
        id: TaxonId,
        filters: &FamilyFilters,
        facets: &dyn Fn(&str) -> Option<FamilyFacets>,
    ) -> Result<usize> {
        let node = self.node(id)?;
        Ok(node
            .family_accessions
            .iter()
            .filter_map(|acc| facets(acc))
            .filter(|f| f.matches(filters))
            .count())
    }

    pub fn all_ids(&self) -> Vec<TaxonId> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

/// Computes `value_parent`/`value_children`: the collapsed projection of
/// the raw tree that skips any node with no family anywhere in the file
/// set. A data-bearing node is its own value_parent; `value_children`
/// records only the *nearest* such descendants per branch (spec.md §9's
/// open-question resolution).
fn derive_value_edges(
    nodes: &[TaxonNode],
    parent: &[Option<Index>],
    children: &[Vec<Index>],
    root: Index,
) -> (Vec<Index>, Vec<Vec<Index>>) {
    let has_families: Vec<bool> = nodes.iter().map(|n| !n.family_accessions.is_empty()).collect();
    let n = nodes.len();

    let mut value_parent = vec![root; n];
    for ix in 0..n {
        if has_families[ix] {
            value_parent[ix] = ix;
            continue;
        }
        let mut cur = parent[ix];
        let mut found = root;
        while let Some(p) = cur {
            if has_families[p] {
                found = p;
                break;
            }
            cur = parent[p];
        }
        value_parent[ix] = found;
    }
    if has_families[root] {
        value_parent[root] = root;
    }

    let mut value_children = vec![Vec::new(); n];
    for ix in 0..n {
        if !has_families[ix] && ix != root {
            continue;
        }
        // BFS down from `ix`, stopping a branch the instant it reaches a
        // data-bearing node (that node becomes a value_child; we do not
        // descend past it).
        let mut queue: VecDeque<Index> = children[ix].iter().copied().collect();
        while let Some(cur) = queue.pop_front() {
            if has_families[cur] {
                value_children[ix].push(cur);
            } else {
                queue.extend(children[cur].iter().copied());
            }
        }
    }

    (value_parent, value_children)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    fn node(id: TaxonId, sci: &str, partition: u32, families: &[&str]) -> TaxonNode {
        TaxonNode {
            id,
            names: vec![(NameKind::Scientific, sci.to_string())],
            partition,
            family_accessions: families.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 1 (root) -> 131567 -> 2 (Bacteria, families) -> 1224 (no families)
    ///   -> 1236 (families)
    pub(crate) fn example() -> TaxonomyIndex {
        let nodes = vec![
            node(1, "root", 0, &[]),
            node(131567, "cellular organisms", 0, &[]),
            node(2, "Bacteria", 0, &["DF000000001"]),
            node(1224, "Proteobacteria", 0, &[]),
            node(1236, "Gammaproteobacteria", 0, &["DF000000002"]),
        ];
        let mut parent_of = HashMap::new();
        parent_of.insert(131567, 1);
        parent_of.insert(2, 131567);
        parent_of.insert(1224, 2);
        parent_of.insert(1236, 1224);
        TaxonomyIndex::build(nodes, parent_of).unwrap()
    }

    #[test]
    fn ancestors_and_descendants() {
        let tax = example();
        assert_eq!(tax.ancestors(1236).unwrap(), vec![1224, 2, 131567, 1]);
        assert_eq!(tax.descendants(131567).unwrap(), vec![2, 1224, 1236]);
    }

    #[test]
    fn value_edges_skip_empty_nodes() {
        let tax = example();
        // 1224 has no families, so its value_parent is 2 (nearest
        // data-bearing ancestor), and 2's value_children is [1236]
        // (skipping over the empty 1224).
        assert_eq!(tax.value_ancestors(1236).unwrap(), vec![2]);
        assert_eq!(tax.value_descendants(2).unwrap(), vec![1236]);
    }

    #[test]
    fn resolve_numeric_term() {
        let tax = example();
        let r = tax.resolve("1236");
        assert_eq!(r.exact, vec![1236]);
    }

    #[test]
    fn resolve_exact_and_partial_names() {
        let tax = example();
        let r = tax.resolve("bacteria");
        assert_eq!(r.exact, vec![2]);
        assert!(r.partial.is_empty());
    }

    #[test]
    fn resolve_unambiguous_prefers_single_exact() {
        let tax = example();
        let r = tax.resolve("bacteria");
        assert_eq!(r.unambiguous().unwrap(), 2);
    }

    #[test]
    fn classification_prefix_matches_component_boundary() {
        assert!(classification_matches_prefix("root;LTR/ERVL", "LTR"));
        assert!(!classification_matches_prefix("root;xLTR/ERVL", "LTR"));
        assert!(classification_matches_prefix("root;LTR/ERVL", "root;LTR"));
    }
}
