//! Error kinds for famdb, grouped the way spec.md §7 groups them: user
//! mistakes, data-integrity problems, and I/O failures each get their own
//! exit code at the CLI boundary. `Warning` is never propagated as an
//! `Err` — it's collected during a query and reported alongside a
//! successful result.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Something the caller asked for that cannot be honored: an ambiguous
/// term, an unknown accession, an unknown output format, contradictory
/// flags. Exit code 1.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UserError {
    pub message: String,
    pub hint: Option<String>,
}

/// A problem with the on-disk store itself: a corrupt file, a schema
/// mismatch, an inconsistent file set, a dangling taxon reference. Exit
/// code 2.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DataError {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    User(#[from] UserError),

    #[error("{0}")]
    Data(#[from] DataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container error: {0}")]
    Container(#[from] crate::container::AdapterError),
}

impl Error {
    pub fn user(message: impl Into<String>) -> Self {
        Error::User(UserError {
            message: message.into(),
            hint: None,
        })
    }

    pub fn user_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::User(UserError {
            message: message.into(),
            hint: Some(hint.into()),
        })
    }

    pub fn data(message: impl Into<String>) -> Self {
        Error::Data(DataError {
            message: message.into(),
        })
    }

    /// The process exit code spec.md §6/§7 assigns to this error's kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::User(_) => 1,
            Error::Data(_) => 2,
            Error::Io(_) => 3,
            Error::Container(e) => e.exit_code(),
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::User(e) => e.hint.as_deref(),
            _ => None,
        }
    }
}

/// A recoverable, non-fatal condition: a missing leaf partition, a family
/// skipped by a filter. Collected during a query so the caller can print
/// one warning line per skip before emitting any results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
