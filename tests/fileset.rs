//! Integration tests for the file-set coordinator, building small two
//! partition exports on disk with the same calls the library itself uses
//! to read and write a container, rather than hand-crafted HDF5 files.
use std::collections::HashMap;
use std::path::Path;

use famdb::container::Container;
use famdb::family::{self, Accession, Family, RepeatMaskerAnnotations};
use famdb::schema::{self, FileIdentity, PartitionEntry};
use famdb::taxonomy::FamilyFilters;
use famdb::FileSet;

fn identity(partition: u32, root_taxon: u32) -> FileIdentity {
    FileIdentity {
        export_name: "Dfam".to_string(),
        export_date: "2024-01-01".to_string(),
        schema_version: (1, 0),
        partition_number: partition,
        partition_root_taxon_id: root_taxon,
        full_partition_table: vec![
            PartitionEntry {
                number: 0,
                root_taxon_id: 1,
                name: "root".to_string(),
            },
            PartitionEntry {
                number: 1,
                root_taxon_id: 9606,
                name: "Homo sapiens".to_string(),
            },
        ],
        creator: "famdb-builder".to_string(),
    }
}

fn write_node(container: &Container, id: u32, parent_id: u32, partition: u32, families: &[&str]) {
    let node = container
        .root()
        .ensure_group(&schema::taxonomy_node_path(id))
        .unwrap();
    node.write_attr("parent_id", &parent_id).unwrap();
    node.write_attr("partition", &partition).unwrap();
    let families: Vec<String> = families.iter().map(|s| s.to_string()).collect();
    node.write_attr("family_accessions", &families).unwrap();
}

fn write_names(container: &Container, names: &HashMap<u32, Vec<(&str, &str)>>) {
    let encoded: HashMap<String, Vec<(String, String)>> = names
        .iter()
        .map(|(id, pairs)| {
            (
                id.to_string(),
                pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            )
        })
        .collect();
    let json = serde_json::to_string(&encoded).unwrap();
    container
        .root()
        .write_dataset_string(schema::DATASET_TAXONOMY_NAMES, &json)
        .unwrap();
}

fn sample_family(accession: &str, classification: &str, clade: u32, consensus: &str) -> Family {
    Family {
        accession: family::parse_accession(accession).unwrap(),
        name: Some(format!("{accession}-name")),
        alt_names: Vec::new(),
        description: None,
        classification: classification.to_string(),
        clades: vec![clade],
        consensus: Some(consensus.to_string()),
        hmm: None,
        citations: Vec::new(),
        date_created: None,
        date_modified: None,
        length: Some(consensus.len() as u64),
        rm: RepeatMaskerAnnotations::default(),
        target_site_cons: None,
        refineable: true,
        extra: Default::default(),
    }
}

fn write_family(container: &Container, fam: &Family) {
    let node = container
        .root()
        .ensure_group(&family::group_path_for(&fam.accession))
        .unwrap();
    family::encode(&node, fam).unwrap();
}

/// Builds a two-partition export in `dir`: partition 0 (root) holds
/// "cellular organisms" -> Bacteria (one curated family), partition 1
/// (root taxon 9606) holds one uncurated family under a human-lineage node.
fn build_sample_export(dir: &Path) {
    let root_path = dir.join("Dfam.0.h5");
    let root = Container::create(&root_path).unwrap();
    schema::write_identity(&root.root(), &identity(0, 1)).unwrap();
    write_node(&root, 1, 1, 0, &[]);
    write_node(&root, 131567, 1, 0, &[]);
    write_node(&root, 2, 131567, 0, &["DF000000001"]);
    // The root's own skeleton copy of a leaf-owned node keeps the family
    // list it had at export time; `fileset::discover` overlays the leaf's
    // own copy over this when the leaf is installed, but the root's copy
    // is what a family ends up routed through if the leaf goes missing.
    write_node(&root, 9606, 131567, 1, &["DR000000001"]);
    let mut names = HashMap::new();
    names.insert(1, vec![("scientific name", "root")]);
    names.insert(131567, vec![("scientific name", "cellular organisms")]);
    names.insert(2, vec![("scientific name", "Bacteria")]);
    names.insert(9606, vec![("scientific name", "Homo sapiens"), ("common name", "human")]);
    write_names(&root, &names);
    write_family(&root, &sample_family("DF000000001", "root;Bacteria", 2, "ACGTACGTACGT"));

    let leaf_path = dir.join("Dfam.1.h5");
    let leaf = Container::create(&leaf_path).unwrap();
    schema::write_identity(&leaf.root(), &identity(1, 9606)).unwrap();
    write_node(&leaf, 9606, 131567, 1, &["DR000000001"]);
    write_family(&leaf, &sample_family("DR000000001", "root;Mammalia", 9606, "TTTTAAAACCCC"));
}

#[test]
fn discovers_a_complete_two_partition_export() {
    let dir = tempfile::tempdir().unwrap();
    build_sample_export(dir.path());

    let set = FileSet::discover(dir.path()).unwrap();
    assert!(set.warnings().is_empty());
    assert_eq!(set.partitions_present(), vec![0, 1]);
    assert_eq!(set.identity.export_name, "Dfam");
}

#[test]
fn routes_family_reads_to_the_owning_partition() {
    let dir = tempfile::tempdir().unwrap();
    build_sample_export(dir.path());
    let set = FileSet::discover(dir.path()).unwrap();

    let curated = set.get_family("DF000000001").unwrap();
    assert_eq!(curated.classification, "root;Bacteria");

    let uncurated = set.get_family("DR000000001").unwrap();
    assert_eq!(uncurated.classification, "root;Mammalia");
}

#[test]
fn resolves_names_and_lineage_across_the_taxonomy() {
    let dir = tempfile::tempdir().unwrap();
    build_sample_export(dir.path());
    let set = FileSet::discover(dir.path()).unwrap();

    let id = famdb::query::resolve_one(&set, "Homo sapiens").unwrap();
    assert_eq!(id, 9606);
    assert_eq!(set.taxonomy.ancestors(9606).unwrap(), vec![131567, 1]);
    assert_eq!(set.taxonomy.value_ancestors(9606).unwrap(), Vec::<u32>::new());
}

#[test]
fn families_for_a_taxon_are_filtered_and_routed_per_partition() {
    let dir = tempfile::tempdir().unwrap();
    build_sample_export(dir.path());
    let set = FileSet::discover(dir.path()).unwrap();

    let (families, warnings) = set
        .iter_families_for_taxon(2, &FamilyFilters::default())
        .unwrap();
    assert!(warnings.is_empty());
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].accession, Accession {
        curated: true,
        digits: "000000001".to_string(),
        version: None,
    });
}

#[test]
fn missing_leaf_partition_is_reported_as_a_warning_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    build_sample_export(dir.path());
    std::fs::remove_file(dir.path().join("Dfam.1.h5")).unwrap();

    let set = FileSet::discover(dir.path()).unwrap();
    assert_eq!(set.partitions_present(), vec![0]);
    assert_eq!(set.warnings().len(), 1);

    let err = set.get_family("DR000000001").unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
