//! Backend contracts consumed by the engine
//!
//! Every collaborator is an `async_trait` object shared as `Arc<dyn _>`.
//! Streaming backends push batches through a borrowed callback; the engine
//! converts them into result events as they arrive.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commits::{CommitSearchRequest, RawCommit};
use crate::error::BackendResult;
use crate::indexed::{IndexedQuery, IndexedSearchBatch, IndexedSearchOptions};
use crate::protocol::{FileMatch, SearcherRequest, SymbolRecord, SymbolRequest};
use crate::repos::{ExcludedRepos, RepoOptions, RepoPage, RepoRef, RepoRevs};

/// The identity on whose behalf a search runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: u32,
    /// Internal actors bypass sub-repository permissions
    #[serde(default)]
    pub internal: bool,
}

impl Actor {
    pub fn user(uid: u32) -> Self {
        Self {
            uid,
            internal: false,
        }
    }

    pub fn internal() -> Self {
        Self {
            uid: 0,
            internal: true,
        }
    }
}

/// Indexed code-search engine.
#[async_trait]
pub trait IndexedSearcher: Send + Sync {
    /// Run a query, streaming one batch per repository.
    async fn search(
        &self,
        query: &IndexedQuery,
        opts: &IndexedSearchOptions,
        on_batch: &(dyn Fn(IndexedSearchBatch) + Send + Sync),
    ) -> BackendResult<()>;

    /// Ids of the given repositories that are indexed at the requested revisions.
    async fn indexed_repos(&self, repos: &[RepoRevs]) -> BackendResult<BTreeSet<u32>>;
}

/// Unindexed line-oriented matcher.
#[async_trait]
pub trait UnindexedSearcher: Send + Sync {
    /// Search one repository revision. Returns whether the file limit was hit.
    async fn search(
        &self,
        request: &SearcherRequest,
        on_matches: &(dyn Fn(Vec<FileMatch>) + Send + Sync),
    ) -> BackendResult<bool>;
}

/// Symbol search over one repository revision.
#[async_trait]
pub trait SymbolSearcher: Send + Sync {
    async fn search(&self, request: &SymbolRequest) -> BackendResult<Vec<SymbolRecord>>;
}

/// Commit and diff search.
#[async_trait]
pub trait CommitSearcher: Send + Sync {
    /// Search one repository. Returns whether the commit limit was hit.
    async fn search(
        &self,
        request: &CommitSearchRequest,
        on_matches: &(dyn Fn(Vec<RawCommit>) + Send + Sync),
    ) -> BackendResult<bool>;
}

/// Repository resolution.
///
/// Guarantees:
/// - Pages are ordered by repository id and never overlap.
/// - `next` is `None` exactly on the last page.
#[async_trait]
pub trait RepoResolver: Send + Sync {
    /// Resolve up to `limit` repositories with id >= `cursor`.
    async fn resolve_page(
        &self,
        opts: &RepoOptions,
        cursor: Option<u32>,
        limit: usize,
    ) -> BackendResult<RepoPage>;

    /// Count repositories dropped by the fork/archived exclusion.
    async fn excluded(&self, opts: &RepoOptions) -> BackendResult<ExcludedRepos>;

    /// Private repositories matching `opts` that the actor can see.
    async fn private_repos(&self, opts: &RepoOptions) -> BackendResult<Vec<RepoRef>>;
}

/// Fine-grained path authorization.
pub trait SubRepoPermissionChecker: Send + Sync {
    /// Whether any sub-repository rules are configured at all.
    fn enabled(&self) -> bool;

    /// Whether `actor` may read `path` in `repo`.
    fn can_read(&self, actor: &Actor, repo: &RepoRef, path: &str) -> BackendResult<bool>;
}
