//! Leaf jobs: each one calls a single kind of backend and converts its
//! native results into `Match` values.
//!
//! - `indexed`: global and repo-subset searches on the indexed engine
//! - `searcher`: unindexed text search, one request per repository revision
//! - `symbols`: unindexed symbol search
//! - `commits`: commit and diff search
//! - `structural`: structural search through the unindexed matcher
//! - `repos`: repository-name search and excluded-repository counts

mod commits;
mod indexed;
mod repos;
mod searcher;
mod structural;
mod symbols;

use std::future::Future;
use std::sync::Arc;

use quarry_backend::{IndexedFileMatch, LineMatch, RepoRef};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::result::{FileMatch, SymbolMatch};

pub use commits::CommitSearchJob;
pub use indexed::{GlobalIndexedSearch, IndexedSubsetSearch};
pub use repos::{ComputeExcludedRepos, RepoSearchJob, RepoSearchMode};
pub use searcher::SearcherJob;
pub use structural::StructuralSearchJob;
pub use symbols::SymbolSearcherJob;

/// `None` for the default branch.
pub(crate) fn rev_of(rev: &str) -> Option<String> {
    if rev.is_empty() || rev == "HEAD" {
        None
    } else {
        Some(rev.to_string())
    }
}

pub(crate) fn from_indexed(file: IndexedFileMatch, rev: Option<String>) -> FileMatch {
    let rev = rev.or_else(|| file.branches.first().and_then(|b| rev_of(b)));
    FileMatch {
        repo: file.repo,
        rev,
        commit: file.commit,
        path: file.file_name,
        line_matches: file
            .line_matches
            .into_iter()
            .map(|l| LineMatch {
                preview: l.line,
                line_number: l.line_number.saturating_sub(1),
                offset_and_lengths: l.fragments.into_iter().map(|(o, n)| [o, n]).collect(),
            })
            .collect(),
        symbols: file
            .symbols
            .into_iter()
            .map(|s| SymbolMatch {
                name: s.name,
                kind: s.kind,
                line: s.line_number.saturating_sub(1),
            })
            .collect(),
        limit_hit: false,
    }
}

pub(crate) fn from_searcher(
    repo: &RepoRef,
    rev: &str,
    file: quarry_backend::FileMatch,
) -> FileMatch {
    FileMatch {
        repo: repo.clone(),
        rev: rev_of(rev),
        commit: rev.to_string(),
        path: file.path,
        line_matches: file.line_matches,
        symbols: Vec::new(),
        limit_hit: file.limit_hit,
    }
}

/// Run `task` for every item with at most `concurrency` tasks in flight.
///
/// Each task gets a child of `ctx`. The first error cancels the remaining
/// tasks and is returned once they have stopped.
pub(crate) async fn fan_out<T, F, Fut>(
    ctx: &SearchContext,
    items: Vec<T>,
    concurrency: usize,
    task: F,
) -> SearchResult<()>
where
    F: Fn(SearchContext, T) -> Fut,
    Fut: Future<Output = SearchResult<()>> + Send + 'static,
{
    let ctx = ctx.child();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for item in items {
        let fut = task(ctx.child(), item);
        let permits = permits.clone();
        tasks.spawn(
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| SearchError::Internal(e.to_string()))?;
                fut.await
            }
            .instrument(tracing::Span::current()),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|e| SearchError::Internal(format!("search task failed: {e}")))
            .and_then(|r| r);
        if let Err(e) = result {
            ctx.cancel();
            tasks.shutdown().await;
            return Err(e);
        }
    }
    Ok(())
}
