//! Error types for quarry-backend

use thiserror::Error;

/// Errors surfaced by search backends and the unindexed matcher client
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request was rejected as malformed (bad pattern, bad glob, ...)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backend is unreachable or refused to serve
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A repository named in a request is unknown to the backend
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// A revision could not be resolved in a repository
    #[error("revision {rev} not found in {repo}")]
    RevisionNotFound { repo: String, rev: String },

    /// The matcher service answered with a non-success status
    #[error("searcher returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The matcher service reported an error in its terminal event
    #[error("searcher error: {0}")]
    Searcher(String),

    /// The event stream was malformed or ended early
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No matcher endpoints are configured
    #[error("no searcher endpoints configured")]
    NoEndpoints,

    /// Transport failure
    #[error("http error: {0}")]
    Http(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Whether the failure stems from the request itself rather than the backend
    pub fn is_bad_request(&self) -> bool {
        matches!(self, BackendError::BadRequest(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl From<regex::Error> for BackendError {
    fn from(err: regex::Error) -> Self {
        BackendError::BadRequest(err.to_string())
    }
}

impl From<globset::Error> for BackendError {
    fn from(err: globset::Error) -> Self {
        BackendError::BadRequest(err.to_string())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;
