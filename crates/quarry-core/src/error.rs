//! Error types for quarry-core

use std::fmt;

use quarry_backend::BackendError;
use thiserror::Error;

use crate::alert::Alert;

/// Errors detected while compiling a query into a job tree.
///
/// Compile errors halt a search before any backend is called.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegexp { pattern: String, message: String },

    #[error("invalid path pattern {pattern:?}: {message}")]
    InvalidPathPattern { pattern: String, message: String },

    #[error("query is not a basic query: {0}")]
    NotBasic(String),

    #[error("invalid select value {0:?}")]
    InvalidSelect(String),

    #[error("invalid timeout value {0:?}")]
    InvalidDuration(String),

    #[error("invalid count value {0:?}")]
    InvalidCount(String),

    #[error("invalid value {value:?} for field {field}")]
    InvalidValue { field: String, value: String },
}

/// Errors surfaced by running a job tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("{backend} backend failed: {message}")]
    Backend { backend: String, message: String },

    #[error("search deadline exceeded")]
    DeadlineExceeded,

    #[error("search canceled")]
    Canceled,

    #[error("no repositories matched the repository filters")]
    NoRepositories,

    #[error("revisions not found: {}", .0.join(", "))]
    MissingRevisions(Vec<String>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Wrap a backend failure with the name of the backend.
    pub fn backend(backend: &str, err: impl fmt::Display) -> Self {
        SearchError::Backend {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }

    /// Map a backend error, keeping the backend name.
    pub fn from_backend(backend: &str, err: BackendError) -> Self {
        Self::backend(backend, err)
    }

    /// Softenable errors are reported as alerts rather than failing a search.
    pub fn is_softenable(&self) -> bool {
        matches!(
            self,
            SearchError::DeadlineExceeded
                | SearchError::NoRepositories
                | SearchError::MissingRevisions(_)
        )
    }

    /// The alert a softenable error turns into.
    pub fn to_alert(&self) -> Option<Alert> {
        match self {
            SearchError::DeadlineExceeded => Some(Alert::deadline_exceeded()),
            SearchError::NoRepositories => Some(Alert::no_repositories()),
            SearchError::MissingRevisions(revs) => Some(Alert::missing_revisions(revs)),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;
