//! Quarry backend contracts
//!
//! This crate defines everything the search engine needs from the outside
//! world, in the native shapes each collaborator speaks:
//!
//! - `traits`: async contracts for the indexed engine, the unindexed matcher,
//!   symbol search, commit search, repository resolution and permissions
//! - `indexed`, `protocol`, `commits`, `repos`: native request/response types
//! - `searcher_client`: HTTP client and event-stream decoder for the matcher
//! - `matcher`: local reference matcher over an in-memory archive
//! - `fakes`: in-memory implementations of every contract

pub mod commits;
mod error;
pub mod fakes;
pub mod indexed;
pub mod matcher;
pub mod protocol;
pub mod repos;
pub mod searcher_client;
pub mod structural;
pub mod traits;

pub use commits::{CommitQuery, CommitSearchRequest, RawCommit, Signature};
pub use error::{BackendError, BackendResult};
pub use indexed::{
    IndexedFileMatch, IndexedKind, IndexedLineMatch, IndexedQuery, IndexedSearchBatch,
    IndexedSearchOptions, IndexedSymbol, RawConfig,
};
pub use matcher::{search_archive, Archive, ArchiveFile, MatchOutcome, Matcher};
pub use protocol::{
    EventDone, FileMatch, LineMatch, PatternInfo, SearcherRequest, SymbolRecord, SymbolRequest,
};
pub use repos::{
    ExcludedRepos, RepoFilter, RepoOptions, RepoPage, RepoRef, RepoRevs, Visibility,
};
pub use searcher_client::{HttpSearcher, SearcherEndpoints};
pub use traits::{
    Actor, CommitSearcher, IndexedSearcher, RepoResolver, SubRepoPermissionChecker,
    SymbolSearcher, UnindexedSearcher,
};
