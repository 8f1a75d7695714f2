//! Layout constants, file identity, change history, and the open/validate/
//! finalize lifecycle (C2). Every reader and writer computes group paths
//! through the functions here so the two-character accession bin (the load
//! bearing schema invariant of spec.md §4.2) never drifts between them.
use serde::{Deserialize, Serialize};

use crate::container::{Container, Node, OpenMode};
use crate::error::{Error, Result};

pub const SCHEMA_VERSION_MAJOR: u32 = 1;
pub const SCHEMA_VERSION_MINOR: u32 = 0;

pub const GROUP_FAMILIES: &str = "Families";
pub const GROUP_LOOKUP_BY_NAME: &str = "Lookup/ByName";
pub const GROUP_LOOKUP_BY_STAGE: &str = "Lookup/ByStage";
pub const GROUP_LOOKUP_BY_TAXON: &str = "Lookup/ByTaxon";
pub const GROUP_TAXONOMY_NODES: &str = "Taxonomy/Nodes";
pub const DATASET_TAXONOMY_NAMES: &str = "Taxonomy/Names";
pub const GROUP_PARTITIONS: &str = "Partitions";
pub const GROUP_REPEATPEPS: &str = "RepeatPeps";
pub const GROUP_FILE_HISTORY: &str = "FileHistory";

/// The two-character bin an accession's per-family group lives under.
/// `DF000001068` bins under `DF`. This caps per-group fan-out at roughly
/// 100² families regardless of library size (spec.md §4.2).
pub fn accession_bin(accession: &str) -> &str {
    let end = accession
        .char_indices()
        .nth(2)
        .map(|(i, _)| i)
        .unwrap_or(accession.len());
    &accession[..end]
}

pub fn family_group_path(accession: &str) -> String {
    format!("{}/{}/{}", GROUP_FAMILIES, accession_bin(accession), accession)
}

pub fn lookup_by_name_path(prefix: &str) -> String {
    format!("{}/{}", GROUP_LOOKUP_BY_NAME, prefix)
}

pub fn lookup_by_stage_path(stage: i32) -> String {
    format!("{}/{}", GROUP_LOOKUP_BY_STAGE, stage)
}

pub fn lookup_by_taxon_path(taxon_id: u32) -> String {
    format!("{}/{}", GROUP_LOOKUP_BY_TAXON, taxon_id)
}

pub fn taxonomy_node_path(taxon_id: u32) -> String {
    format!("{}/{}", GROUP_TAXONOMY_NODES, taxon_id)
}

pub fn partition_path(partition: u32) -> String {
    format!("{}/{}", GROUP_PARTITIONS, partition)
}

/// File-identity attributes (spec.md §3 "File identity"). A file set is
/// valid iff every member shares `export_name`, `export_date`,
/// `schema_version`, and `partition_table`, and exactly one declares
/// `partition_number == 0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileIdentity {
    pub export_name: String,
    pub export_date: String,
    pub schema_version: (u32, u32),
    pub partition_number: u32,
    pub partition_root_taxon_id: u32,
    pub full_partition_table: Vec<PartitionEntry>,
    pub creator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionEntry {
    pub number: u32,
    pub root_taxon_id: u32,
    pub name: String,
}

impl FileIdentity {
    /// The fields that must be identical across every file in a set.
    /// `partition_number` and `partition_root_taxon_id` are deliberately
    /// excluded — those are what make files distinct members of the set.
    fn shared_key(&self) -> (&str, &str, (u32, u32), &[PartitionEntry]) {
        (
            &self.export_name,
            &self.export_date,
            self.schema_version,
            &self.full_partition_table,
        )
    }

    pub fn shares_identity_with(&self, other: &FileIdentity) -> bool {
        self.shared_key() == other.shared_key()
    }
}

const ATTR_IDENTITY: &str = "famdb_identity";

pub fn read_identity(node: &Node) -> Result<FileIdentity> {
    node.read_attr(ATTR_IDENTITY)
        .map_err(|_| Error::data("file is missing its famdb identity attributes"))
}

pub fn write_identity(node: &Node, identity: &FileIdentity) -> Result<()> {
    node.write_attr(ATTR_IDENTITY, identity)?;
    Ok(())
}

pub fn check_schema_version(identity: &FileIdentity) -> Result<()> {
    if identity.schema_version.0 != SCHEMA_VERSION_MAJOR {
        return Err(Error::data(format!(
            "schema version {}.{} is incompatible with reader version {}.{}",
            identity.schema_version.0,
            identity.schema_version.1,
            SCHEMA_VERSION_MAJOR,
            SCHEMA_VERSION_MINOR
        )));
    }
    Ok(())
}

/// One entry in a file's append-only change-history ledger (spec.md §3
/// "Change history"). An entry is opened at the start of a write and
/// closed when the write commits; a file with any open entry is CORRUPT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub operation: String,
    pub completed: bool,
}

pub fn read_history(node: &Node) -> Result<Vec<HistoryEntry>> {
    match node.open_group(GROUP_FILE_HISTORY) {
        Ok(history) => {
            let mut entries = Vec::new();
            for timestamp in history.children()? {
                let entry_group = history.open_group(&timestamp)?;
                for op in entry_group.children()? {
                    let completed: bool = entry_group.read_attr(&op).unwrap_or(false);
                    entries.push(HistoryEntry {
                        timestamp: timestamp.clone(),
                        operation: op,
                        completed,
                    });
                }
            }
            entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            Ok(entries)
        }
        Err(_) => Ok(Vec::new()),
    }
}

/// True if any history entry is open (`completed == false`). Such a file
/// is refused for read per spec.md §3/§7.
pub fn has_open_history_entry(entries: &[HistoryEntry]) -> bool {
    entries.iter().any(|e| !e.completed)
}

/// Validates identity and refuses files with an open history entry.
/// Returns the validated identity so callers don't have to re-read it.
pub fn open_for_read(container: &Container) -> Result<FileIdentity> {
    if container.mode() != OpenMode::Read {
        return Err(Error::data("open_for_read called on a writable handle"));
    }
    let root = container.root();
    let identity = read_identity(&root)?;
    check_schema_version(&identity)?;
    let history = read_history(&root)?;
    if has_open_history_entry(&history) {
        return Err(Error::data(
            "file has an open change-history entry and is considered corrupt; run the repair tool",
        ));
    }
    Ok(identity)
}

/// A guard returned by [`begin_write`]. Flips the opened history entry to
/// `completed = true` on a normal drop; an abnormal termination (panic, or
/// the guard simply never reaching `commit`) leaves it `false`, poisoning
/// the file for future opens until `repair_history` clears it (spec.md
/// §4.2's lifecycle, §5's WRITING state).
pub struct WriteGuard<'a> {
    root: Node<'a>,
    timestamp: String,
    operation: String,
    committed: bool,
}

impl<'a> WriteGuard<'a> {
    pub fn commit(mut self) -> Result<()> {
        self.mark(true)?;
        self.committed = true;
        Ok(())
    }

    fn mark(&self, completed: bool) -> Result<()> {
        let entry_group = self
            .root
            .ensure_group(&format!("{}/{}", GROUP_FILE_HISTORY, self.timestamp))?;
        entry_group.write_attr(&self.operation, &completed)?;
        Ok(())
    }
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        if !self.committed {
            // Leave completed = false: the entry was already written as
            // false by `begin_write`, so there is nothing to do here. The
            // file is now considered corrupt on next open, by design.
        }
    }
}

pub fn begin_write<'a>(
    container: &'a Container,
    timestamp: impl Into<String>,
    operation: impl Into<String>,
) -> Result<WriteGuard<'a>> {
    if container.mode() != OpenMode::Write {
        return Err(Error::data("begin_write called on a read-only handle"));
    }
    let root = container.root();
    let identity = read_identity(&root)?;
    check_schema_version(&identity)?;
    let timestamp = timestamp.into();
    let operation = operation.into();
    let entry_group = root.ensure_group(&format!("{}/{}", GROUP_FILE_HISTORY, timestamp))?;
    entry_group.write_attr(&operation, &false)?;
    Ok(WriteGuard {
        root,
        timestamp,
        operation,
        committed: false,
    })
}

/// Clears a dangling open history entry left by an interrupted write,
/// without pretending the interrupted write itself succeeded: it appends
/// a `repair` entry rather than flipping the old one (see SPEC_FULL.md §C).
pub fn repair_history(container: &Container, timestamp: impl Into<String>) -> Result<()> {
    if container.mode() != OpenMode::Write {
        return Err(Error::data("repair_history requires a writable handle"));
    }
    let root = container.root();
    let history = read_history(&root)?;
    if !has_open_history_entry(&history) {
        return Err(Error::user("file has no open history entry to repair"));
    }
    let entry_group = root.ensure_group(&format!("{}/{}", GROUP_FILE_HISTORY, timestamp.into()))?;
    entry_group.write_attr("repair", &true)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn identity(export_date: &str, partition: u32) -> FileIdentity {
        FileIdentity {
            export_name: "Dfam".to_string(),
            export_date: export_date.to_string(),
            schema_version: (1, 0),
            partition_number: partition,
            partition_root_taxon_id: if partition == 0 { 1 } else { 9606 },
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

    #[test]
    fn accession_bin_takes_first_two_chars() {
        assert_eq!(accession_bin("DF000001068"), "DF");
        assert_eq!(accession_bin("DR000000001"), "DR");
        assert_eq!(accession_bin("D"), "D");
    }

    #[test]
    fn shared_identity_ignores_partition_fields() {
        let a = identity("2024-01-01", 0);
        let b = identity("2024-01-01", 1);
        assert!(a.shares_identity_with(&b));
    }

    #[test]
    fn shared_identity_rejects_mismatched_export_date() {
        let a = identity("2024-01-01", 0);
        let b = identity("2024-02-01", 1);
        assert!(!a.shares_identity_with(&b));
    }

    #[test]
    fn open_history_entry_detected() {
        let entries = vec![
            HistoryEntry {
                timestamp: "t0".to_string(),
                operation: "append".to_string(),
                completed: true,
            },
            HistoryEntry {
                timestamp: "t1".to_string(),
                operation: "append".to_string(),
                completed: false,
            },
        ];
        assert!(has_open_history_entry(&entries));
    }
}
