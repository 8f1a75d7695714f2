//! Offline, read-mostly store and query engine for transposable-element
//! family models and their taxonomy subset (see `famdb` binary for the
//! CLI surface built on top of this library).
pub mod append;
pub mod container;
pub mod edit;
pub mod error;
pub mod family;
pub mod fileset;
pub mod format;
pub mod name_kind;
pub mod query;
pub mod schema;
pub mod taxonomy;

pub use crate::error::{Error, Result, Warning};
pub use crate::family::Family;
pub use crate::fileset::FileSet;
pub use crate::taxonomy::{TaxonId, TaxonomyIndex};
