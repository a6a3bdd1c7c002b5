//! Executable job trees
//!
//! A job is an immutable node that runs against a `SearchContext`, the
//! shared backend `Clients` and a result `Sender`:
//!
//! - combinators (`Parallel`, `Priority`, `And`, `Or`, `Limit`, `Timeout`,
//!   `Select`, `Filter`, `AlertJob`, `Noop`) compose other jobs
//! - `leaves` call exactly one kind of backend
//! - `RepoPager` resolves repositories page by page and runs page-scoped
//!   leaves for each page
//!
//! Children run on their own tasks inside a `JoinSet` owned by the parent.
//! A parent never returns while a child task is still running.

mod alert;
mod boolean;
mod filter;
pub mod leaves;
mod limit;
mod noop;
mod pager;
mod parallel;
pub mod printer;
mod priority;
mod select;
mod timeout;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::alert::Alert;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::streaming::SharedSender;

pub use alert::AlertJob;
pub use boolean::{And, Or};
pub use filter::Filter;
pub use leaves::{
    CommitSearchJob, ComputeExcludedRepos, GlobalIndexedSearch, IndexedSubsetSearch,
    RepoSearchJob, RepoSearchMode, SearcherJob, StructuralSearchJob, SymbolSearcherJob,
};
pub use limit::Limit;
pub use noop::Noop;
pub use pager::{RepoPager, ScopedRepos};
pub use parallel::Parallel;
pub use priority::Priority;
pub use select::Select;
pub use timeout::Timeout;

/// Outcome of a job: an optional alert, or an error.
pub type JobResult = SearchResult<Option<Alert>>;

pub type JobRef = Arc<dyn Job>;

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender)
        -> JobResult;

    /// Short name used in logs and printed trees.
    fn name(&self) -> &'static str;

    fn children(&self) -> Vec<JobRef> {
        Vec::new()
    }

    /// Printable `(key, value)` pairs describing the job's configuration.
    fn fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// A copy of this job restricted to one page of repositories.
    ///
    /// Jobs that are not repository-scoped return `None` and are run as is.
    fn with_repos(&self, _repos: &Arc<ScopedRepos>) -> Option<JobRef> {
        None
    }
}

/// Run a job with lifecycle events and counters.
pub async fn run_job(
    job: &dyn Job,
    ctx: &SearchContext,
    clients: &Clients,
    stream: &SharedSender,
) -> JobResult {
    let name = job.name();
    let started = Instant::now();
    METRICS.inc_jobs_run();
    obs::emit_job_started(name);
    let result = job.run(ctx, clients, stream).await;
    let elapsed = started.elapsed().as_millis() as u64;
    match &result {
        Ok(alert) => obs::emit_job_finished(name, elapsed, alert.is_some()),
        Err(e) => {
            METRICS.inc_jobs_failed();
            obs::emit_job_failed(name, e);
        }
    }
    result
}

/// Child tasks of a combinator.
pub(crate) struct Children {
    set: JoinSet<(usize, JobResult)>,
}

impl Children {
    pub(crate) fn new() -> Self {
        Self {
            set: JoinSet::new(),
        }
    }

    /// Spawn `job` as child number `index`.
    pub(crate) fn spawn(
        &mut self,
        index: usize,
        job: JobRef,
        ctx: SearchContext,
        clients: Clients,
        stream: SharedSender,
    ) {
        let span = tracing::Span::current();
        self.set.spawn(
            async move {
                let result = run_job(job.as_ref(), &ctx, &clients, &stream).await;
                (index, result)
            }
            .instrument(span),
        );
    }

    /// Wait for the next child. A panicked or aborted task is an internal error.
    pub(crate) async fn join_next(&mut self) -> Option<(usize, JobResult)> {
        let joined = self.set.join_next().await?;
        Some(match joined {
            Ok(out) => out,
            Err(e) => (
                usize::MAX,
                Err(SearchError::Internal(format!("job task failed: {e}"))),
            ),
        })
    }

    /// Abort every remaining child and wait for them to stop.
    pub(crate) async fn shutdown(&mut self) {
        self.set.shutdown().await;
    }
}
