//! File-set coordinator (C5): discovers root + leaf files in a directory,
//! verifies they form one consistent export, and routes reads to the
//! owning partition. This is the only component that crosses files.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::container::Container;
use crate::error::{Error, Result, Warning};
use crate::family::{self, Family};
use crate::name_kind::NameKind;
use crate::schema::{self, FileIdentity};
use crate::taxonomy::{FamilyFacets, FamilyFilters, TaxonId, TaxonNode, TaxonomyIndex};
use tracing::{debug, warn};

/// One open partition file: either the root (partition 0) or a leaf.
pub struct LeafFile {
    pub partition: u32,
    container: Container,
}

impl LeafFile {
    fn open(path: &Path) -> Result<(Self, FileIdentity)> {
        let container = Container::open_read(path)?;
        let identity = schema::open_for_read(&container)?;
        Ok((
            LeafFile {
                partition: identity.partition_number,
                container,
            },
            identity,
        ))
    }

    pub fn get_family(&self, accession: &str) -> Result<Family> {
        let parsed = family::parse_accession(accession)?;
        let path = family::group_path_for(&parsed);
        let node = self
            .container
            .root()
            .open_group(&path)
            .map_err(|_| Error::user(format!("unknown accession '{accession}'")))?;
        family::decode(&node, &parsed.unversioned())
    }

    fn facets_for(&self, accession: &str) -> Option<FamilyFacets> {
        let fam = self.get_family(accession).ok()?;
        Some(FamilyFacets {
            curated: fam.curated(),
            classification: fam.classification.clone(),
            name: fam.name.clone(),
            search_stages: fam.rm.search_stages.clone(),
            buffer_stages: fam.rm.buffer_stages.iter().map(|b| b.stage).collect(),
            has_general_threshold: fam.has_general_threshold(),
        })
    }
}

pub struct FileSet {
    pub identity: FileIdentity,
    root: LeafFile,
    leaves: HashMap<u32, LeafFile>,
    pub taxonomy: TaxonomyIndex,
    accession_to_partition: HashMap<String, u32>,
    discovery_warnings: Vec<Warning>,
}

fn partition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let parts: Vec<&str> = name.rsplitn(3, '.').collect();
        if parts.len() == 3 && parts[0] == "h5" && parts[1].parse::<u32>().is_ok() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn read_taxonomy_nodes(node: &crate::container::Node) -> Result<(Vec<TaxonNode>, HashMap<TaxonId, TaxonId>)> {
    let taxonomy_group = node.open_group(schema::GROUP_TAXONOMY_NODES)?;
    let mut nodes = Vec::new();
    let mut parent_of = HashMap::new();
    for id_str in taxonomy_group.children()? {
        let id: TaxonId = id_str
            .parse()
            .map_err(|_| Error::data(format!("non-numeric taxon id '{id_str}' in Taxonomy/Nodes")))?;
        let entry = taxonomy_group.open_group(&id_str)?;
        let parent_id: TaxonId = entry.read_attr("parent_id").unwrap_or(id);
        let partition: u32 = entry.read_attr("partition").unwrap_or(0);
        let family_accessions: Vec<String> = entry.read_attr("family_accessions").unwrap_or_default();
        if id != 1 {
            parent_of.insert(id, parent_id);
        }
        nodes.push(TaxonNode {
            id,
            names: Vec::new(),
            partition,
            family_accessions,
        });
    }

    let names_json = node.read_dataset_string(schema::DATASET_TAXONOMY_NAMES).unwrap_or_default();
    if !names_json.is_empty() {
        let all_names: HashMap<String, Vec<(String, String)>> =
            serde_json::from_str(&names_json).map_err(|e| Error::data(e.to_string()))?;
        for taxon_node in nodes.iter_mut() {
            if let Some(pairs) = all_names.get(&taxon_node.id.to_string()) {
                taxon_node.names = pairs
                    .iter()
                    .map(|(kind, text)| (kind.parse::<NameKind>().unwrap(), text.clone()))
                    .collect();
            }
        }
    }

    Ok((nodes, parent_of))
}

impl FileSet {
    /// Enumerates `*.<N>.h5` files in `dir`, opens each, and verifies they
    /// form one consistent export (spec.md §4.5, §8's file-set invariant).
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let paths = partition_files(dir)?;
        if paths.is_empty() {
            return Err(Error::data(format!(
                "no famdb files found in {}",
                dir.display()
            )));
        }

        let mut root: Option<(LeafFile, FileIdentity)> = None;
        let mut leaves: HashMap<u32, LeafFile> = HashMap::new();
        let mut shared_identity: Option<FileIdentity> = None;

        for path in &paths {
            let (leaf, identity) = LeafFile::open(path)?;
            if let Some(shared) = &shared_identity {
                if !shared.shares_identity_with(&identity) {
                    return Err(Error::data(format!(
                        "{} does not belong to the same export as the rest of {}",
                        path.display(),
                        dir.display()
                    )));
                }
            } else {
                shared_identity = Some(identity.clone());
            }

            if identity.partition_number == 0 {
                if root.is_some() {
                    return Err(Error::data("more than one file declares partition 0"));
                }
                root = Some((leaf, identity));
            } else {
                leaves.insert(identity.partition_number, leaf);
            }
        }

        let (root, root_identity) = root.ok_or_else(|| Error::data("no file declares partition 0 (root)"))?;

        let mut discovery_warnings = Vec::new();
        for entry in &root_identity.full_partition_table {
            if entry.number != 0 && !leaves.contains_key(&entry.number) {
                warn!(partition = entry.number, "leaf file not installed");
                discovery_warnings.push(Warning::new(format!(
                    "partition {} not installed",
                    entry.number
                )));
            }
        }
        debug!(partitions = paths.len(), dir = %dir.display(), "opened famdb file set");

        let (mut nodes, parent_of) = read_taxonomy_nodes(&root.container.root())?;

        // Overlay family_accessions from whichever file actually owns
        // each partition, since the root's own copy of a leaf's nodes
        // typically doesn't carry family lists (spec.md §3: "present only
        // in the partition that owns this node").
        for node in nodes.iter_mut() {
            if node.partition == 0 {
                continue;
            }
            if let Some(leaf) = leaves.get(&node.partition) {
                if let Ok((leaf_nodes, _)) = read_taxonomy_nodes(&leaf.container.root()) {
                    if let Some(owned) = leaf_nodes.iter().find(|n| n.id == node.id) {
                        node.family_accessions = owned.family_accessions.clone();
                    }
                }
            }
        }

        let taxonomy = TaxonomyIndex::build(nodes, parent_of)?;

        for entry in &root_identity.full_partition_table {
            if let Ok(actual) = taxonomy.partition_of(entry.root_taxon_id) {
                if actual != entry.number {
                    return Err(Error::data(format!(
                        "partition {} declares root taxon {}, but that taxon belongs to partition {}",
                        entry.number, entry.root_taxon_id, actual
                    )));
                }
            }
        }

        let mut accession_to_partition: HashMap<String, u32> = HashMap::new();
        for id in taxonomy.all_ids() {
            let node = taxonomy.node(id)?;
            for acc in &node.family_accessions {
                accession_to_partition.entry(acc.clone()).or_insert(node.partition);
            }
        }

        Ok(FileSet {
            identity: root_identity,
            root,
            leaves,
            taxonomy,
            accession_to_partition,
            discovery_warnings,
        })
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.discovery_warnings
    }

    fn leaf_for_partition(&self, partition: u32) -> Option<&LeafFile> {
        if partition == 0 {
            Some(&self.root)
        } else {
            self.leaves.get(&partition)
        }
    }

    pub fn partitions_present(&self) -> Vec<u32> {
        let mut out: Vec<u32> = std::iter::once(0).chain(self.leaves.keys().copied()).collect();
        out.sort_unstable();
        out
    }

    /// Loads a family by accession, routing to its owning partition
    /// (spec.md §4.5). Returns a `DataError` if the owning partition isn't
    /// installed.
    pub fn get_family(&self, accession: &str) -> Result<Family> {
        let parsed = family::parse_accession(accession)?;
        let unversioned = parsed.unversioned();
        let partition = *self
            .accession_to_partition
            .get(&unversioned)
            .ok_or_else(|| Error::user(format!("unknown accession '{accession}'")))?;
        let leaf = self.leaf_for_partition(partition).ok_or_else(|| {
            Error::data(format!(
                "family {accession} lives in partition {partition}, which is not installed"
            ))
        })?;
        leaf.get_family(&unversioned)
    }

    fn facets_for(&self, partition: u32, accession: &str) -> Option<FamilyFacets> {
        self.leaf_for_partition(partition)?.facets_for(accession)
    }

    /// Iterates families owned directly by `id`, grouped by partition to
    /// preserve file locality, applying `filters` along the way.
    pub fn iter_families_for_taxon(
        &self,
        id: TaxonId,
        filters: &FamilyFilters,
    ) -> Result<(Vec<Family>, Vec<Warning>)> {
        self.families_for_taxa(&[id], filters)
    }

    /// Same, but for a set of taxa at once — unions their accession lists
    /// before iterating per-partition (spec.md §4.5).
    pub fn families_for_taxa(
        &self,
        ids: &[TaxonId],
        filters: &FamilyFilters,
    ) -> Result<(Vec<Family>, Vec<Warning>)> {
        let mut by_partition: HashMap<u32, Vec<String>> = HashMap::new();
        let mut seen = std::collections::HashSet::new();
        for &id in ids {
            let node = self.taxonomy.node(id)?;
            for acc in &node.family_accessions {
                if seen.insert(acc.clone()) {
                    by_partition.entry(node.partition).or_default().push(acc.clone());
                }
            }
        }

        let mut warnings = Vec::new();
        let mut results = Vec::new();
        let mut partitions: Vec<u32> = by_partition.keys().copied().collect();
        partitions.sort_unstable();
        for partition in partitions {
            let Some(leaf) = self.leaf_for_partition(partition) else {
                warn!(partition, "skipping families in uninstalled partition");
                warnings.push(Warning::new(format!("partition {partition} not installed")));
                continue;
            };
            let mut accs = by_partition.remove(&partition).unwrap_or_default();
            accs.sort();
            for acc in accs {
                let Some(facets) = leaf.facets_for(&acc) else {
                    continue;
                };
                if !facets.matches(filters) {
                    continue;
                }
                results.push(leaf.get_family(&acc)?);
            }
        }
        Ok((results, warnings))
    }

    pub fn count_families(&self, id: TaxonId, filters: &FamilyFilters) -> Result<usize> {
        let node = self.taxonomy.node(id)?;
        let partition = node.partition;
        self.taxonomy.count_families(id, filters, &|acc| self.facets_for(partition, acc))
    }
}
