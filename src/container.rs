//! Thin binding over the on-disk hierarchical array container (C1).
//!
//! This module is the only place that talks to the `hdf5` crate directly.
//! Everything above it works with `Group`/`Dataset` handles and the small
//! `AdapterError` kind below — no container-specific types or quirks leak
//! past this file. Schema layout (C2), the family codec (C3), and the
//! file-set coordinator (C5) are built entirely on the operations here.
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

/// Errors normalized out of the underlying container library. Anything the
/// container can fail at collapses into one of these four buckets.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("wrong type for {0}")]
    WrongType(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("file is locked: {0}")]
    Locked(String),
}

impl AdapterError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AdapterError::NotFound(_) | AdapterError::WrongType(_) => 2,
            AdapterError::Io(_) | AdapterError::Locked(_) => 3,
        }
    }
}

type AResult<T> = std::result::Result<T, AdapterError>;

fn normalize(err: hdf5::Error) -> AdapterError {
    let msg = err.to_string();
    if msg.contains("lock") {
        AdapterError::Locked(msg)
    } else if msg.contains("doesn't exist") || msg.contains("not found") {
        AdapterError::NotFound(msg)
    } else {
        AdapterError::Io(msg)
    }
}

/// Whether a container handle was opened for reading only or for reading
/// and writing. Read handles disable file locking (spec.md §5: "File
/// locking at the container layer is disabled for reads").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

pub struct Container {
    file: hdf5::File,
    mode: OpenMode,
}

impl Container {
    pub fn open_read(path: impl AsRef<Path>) -> AResult<Self> {
        let file = hdf5::file::FileBuilder::new()
            .with_fapl(|fapl| fapl.file_locking(false))
            .open(path.as_ref())
            .map_err(normalize)?;
        Ok(Container {
            file,
            mode: OpenMode::Read,
        })
    }

    pub fn open_write(path: impl AsRef<Path>) -> AResult<Self> {
        let file = hdf5::File::open_rw(path.as_ref()).map_err(normalize)?;
        Ok(Container {
            file,
            mode: OpenMode::Write,
        })
    }

    pub fn create(path: impl AsRef<Path>) -> AResult<Self> {
        let file = hdf5::File::create(path.as_ref()).map_err(normalize)?;
        Ok(Container {
            file,
            mode: OpenMode::Write,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn close(self) -> AResult<()> {
        self.file.close().map_err(normalize)
    }

    pub fn root(&self) -> Node<'_> {
        Node {
            inner: NodeRef::File(&self.file),
        }
    }
}

/// A handle to either the root file or a group within it. Most code never
/// needs to distinguish the two, so both are exposed through the same
/// surface.
pub struct Node<'a> {
    inner: NodeRef<'a>,
}

enum NodeRef<'a> {
    File(&'a hdf5::File),
    Group(hdf5::Group),
}

impl<'a> Node<'a> {
    fn group_handle(&self) -> &hdf5::Group {
        match &self.inner {
            NodeRef::File(f) => f.as_group(),
            NodeRef::Group(g) => g,
        }
    }

    /// Open an existing group by path, failing with `NotFound` if absent.
    pub fn open_group(&self, path: &str) -> AResult<Node<'static>> {
        let g = self.group_handle().group(path).map_err(normalize)?;
        Ok(Node {
            inner: NodeRef::Group(g),
        })
    }

    /// Open a group by path, creating every missing segment along the way.
    pub fn ensure_group(&self, path: &str) -> AResult<Node<'static>> {
        let g = match self.group_handle().group(path) {
            Ok(g) => g,
            Err(_) => self
                .group_handle()
                .create_group(path)
                .map_err(normalize)?,
        };
        Ok(Node {
            inner: NodeRef::Group(g),
        })
    }

    pub fn group_exists(&self, path: &str) -> bool {
        self.group_handle().group(path).is_ok()
    }

    /// Names of the immediate children of this node (groups or datasets).
    pub fn children(&self) -> AResult<Vec<String>> {
        self.group_handle().member_names().map_err(normalize)
    }

    pub fn read_attr<T: DeserializeOwned>(&self, name: &str) -> AResult<T> {
        let attr = self
            .group_handle()
            .attr(name)
            .map_err(|_| AdapterError::NotFound(name.to_string()))?;
        let json: String = attr.read_scalar().map_err(normalize)?;
        serde_json::from_str(&json).map_err(|e| AdapterError::WrongType(e.to_string()))
    }

    pub fn write_attr<T: Serialize>(&self, name: &str, value: &T) -> AResult<()> {
        let json = serde_json::to_string(value).map_err(|e| AdapterError::WrongType(e.to_string()))?;
        let attr = match self.group_handle().attr(name) {
            Ok(a) => a,
            Err(_) => self
                .group_handle()
                .new_attr::<hdf5::types::VarLenUnicode>()
                .create(name)
                .map_err(normalize)?,
        };
        attr.write_scalar(&json).map_err(normalize)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.group_handle().attr(name).is_ok()
    }

    pub fn read_dataset_string(&self, name: &str) -> AResult<String> {
        let ds = self
            .group_handle()
            .dataset(name)
            .map_err(|_| AdapterError::NotFound(name.to_string()))?;
        ds.read_scalar::<hdf5::types::VarLenUnicode>()
            .map(|s| s.to_string())
            .map_err(normalize)
    }

    pub fn write_dataset_string(&self, name: &str, value: &str) -> AResult<()> {
        let data: hdf5::types::VarLenUnicode = value.parse().map_err(|_| {
            AdapterError::WrongType(format!("could not encode dataset {name} as text"))
        })?;
        let ds = match self.group_handle().dataset(name) {
            Ok(ds) => ds,
            Err(_) => self
                .group_handle()
                .new_dataset::<hdf5::types::VarLenUnicode>()
                .shape(())
                .deflate(6)
                .create(name)
                .map_err(normalize)?,
        };
        ds.write_scalar(&data).map_err(normalize)
    }

    pub fn read_dataset_bytes(&self, name: &str) -> AResult<Vec<u8>> {
        let ds = self
            .group_handle()
            .dataset(name)
            .map_err(|_| AdapterError::NotFound(name.to_string()))?;
        ds.read_raw::<u8>().map_err(normalize)
    }

    pub fn write_dataset_bytes(&self, name: &str, value: &[u8]) -> AResult<()> {
        let ds = self
            .group_handle()
            .new_dataset::<u8>()
            .shape(value.len())
            .deflate(6)
            .create(name)
            .map_err(normalize)?;
        ds.write_raw(value).map_err(normalize)
    }

    pub fn read_string_list(&self, name: &str) -> AResult<Vec<String>> {
        let ds = self
            .group_handle()
            .dataset(name)
            .map_err(|_| AdapterError::NotFound(name.to_string()))?;
        let values = ds
            .read_raw::<hdf5::types::VarLenUnicode>()
            .map_err(normalize)?;
        Ok(values.into_iter().map(|v| v.to_string()).collect())
    }

    pub fn write_string_list(&self, name: &str, values: &[String]) -> AResult<()> {
        let encoded: std::result::Result<Vec<hdf5::types::VarLenUnicode>, _> =
            values.iter().map(|v| v.parse()).collect();
        let encoded =
            encoded.map_err(|_| AdapterError::WrongType(format!("bad string in {name}")))?;
        let ds = self
            .group_handle()
            .new_dataset::<hdf5::types::VarLenUnicode>()
            .shape(encoded.len())
            .deflate(6)
            .create(name)
            .map_err(normalize)?;
        ds.write_raw(&encoded).map_err(normalize)
    }

    pub fn create_soft_link(&self, target: &str, name: &str) -> AResult<()> {
        self.group_handle()
            .link_soft(target, name)
            .map_err(normalize)
    }

    pub fn resolve_soft_link(&self, name: &str) -> AResult<String> {
        self.group_handle()
            .link_type(name)
            .map_err(normalize)
            .map(|_| name.to_string())
    }
}
