use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_backend::{BackendError, PatternInfo, RepoRef, SearcherRequest};

use super::{fan_out, from_searcher};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::job::{Job, JobRef, JobResult, ScopedRepos};
use crate::result::Match;
use crate::streaming::{SearchEvent, SharedSender, Stats};

/// Unindexed text search: one matcher request per repository revision.
///
/// Without a full deadline each request gets its own short deadline; a
/// repository that misses it is reported as timed out rather than failing
/// the search.
#[derive(Clone)]
pub struct SearcherJob {
    pattern_info: Arc<PatternInfo>,
    use_full_deadline: bool,
    fetch_timeout: Duration,
    concurrency: usize,
    search_indexed: bool,
    repos: Option<Arc<ScopedRepos>>,
}

impl SearcherJob {
    pub fn new(
        pattern_info: PatternInfo,
        use_full_deadline: bool,
        fetch_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            pattern_info: Arc::new(pattern_info),
            use_full_deadline,
            fetch_timeout,
            concurrency,
            search_indexed: false,
            repos: None,
        }
    }

    /// Also search the indexed repositories of a page.
    pub fn searching_indexed(mut self) -> Self {
        self.search_indexed = true;
        self
    }

    pub fn into_ref(self) -> JobRef {
        Arc::new(self)
    }
}

struct Target {
    repo: RepoRef,
    rev: String,
    indexed: bool,
}

#[allow(clippy::too_many_arguments)]
async fn search_repo(
    ctx: SearchContext,
    clients: Clients,
    stream: SharedSender,
    info: Arc<PatternInfo>,
    target: Target,
    use_full_deadline: bool,
    fetch_timeout: Duration,
) -> SearchResult<()> {
    let repo_ctx = if use_full_deadline {
        ctx.child()
    } else {
        ctx.with_timeout(fetch_timeout)
    };
    let request = SearcherRequest {
        repo: target.repo.name.clone(),
        repo_id: target.repo.id,
        commit: target.rev.clone(),
        url: None,
        fetch_timeout_ms: fetch_timeout.as_millis() as u64,
        pattern_info: (*info).clone(),
        indexed: target.indexed,
        indexer_endpoints: Vec::new(),
    };

    let on_matches = |files: Vec<quarry_backend::FileMatch>| {
        let results = files
            .into_iter()
            .map(|f| Match::File(from_searcher(&target.repo, &target.rev, f)))
            .collect();
        stream.send(SearchEvent::results(results));
    };

    let mut stats = Stats::default();
    match repo_ctx.run(clients.searcher.search(&request, &on_matches)).await {
        Ok(Ok(limit_hit)) => {
            stats.repos.insert(target.repo.clone());
            stats.is_limit_hit = limit_hit;
        }
        Ok(Err(BackendError::RepoNotFound(_) | BackendError::RevisionNotFound { .. })) => {
            stats
                .missing_revs
                .push(format!("{}@{}", target.repo.name, target.rev));
        }
        Ok(Err(e)) => return Err(SearchError::from_backend("searcher", e)),
        Err(SearchError::DeadlineExceeded) if !ctx.is_done() => {
            tracing::debug!(repo = %target.repo.name, "repository search timed out");
            stats.timedout.insert(target.repo.clone());
        }
        Err(e) => return Err(e),
    }
    stream.send(SearchEvent::stats(stats));
    Ok(())
}

#[async_trait]
impl Job for SearcherJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let Some(scoped) = &self.repos else {
            return Ok(None);
        };

        let mut targets = Vec::new();
        let mut add = |repos: &[quarry_backend::RepoRevs], indexed: bool| {
            for repo in repos {
                for rev in repo.revs_or_head() {
                    targets.push(Target {
                        repo: repo.repo.clone(),
                        rev,
                        indexed,
                    });
                }
            }
        };
        add(&scoped.unindexed, false);
        if self.search_indexed {
            add(&scoped.indexed, true);
        }
        if targets.is_empty() {
            return Ok(None);
        }

        fan_out(ctx, targets, self.concurrency, |repo_ctx, target| {
            search_repo(
                repo_ctx,
                clients.clone(),
                stream.clone(),
                self.pattern_info.clone(),
                target,
                self.use_full_deadline,
                self.fetch_timeout,
            )
        })
        .await?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "SearcherJob"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let info = &self.pattern_info;
        let mut fields = vec![("pattern", format!("{:?}", info.pattern))];
        if info.is_regexp {
            fields.push(("regexp", "true".to_string()));
        }
        if info.is_structural_pat {
            fields.push(("structural", "true".to_string()));
        }
        if info.is_negated {
            fields.push(("negated", "true".to_string()));
        }
        if !info.include_patterns.is_empty() {
            fields.push(("include", info.include_patterns.join(",")));
        }
        if !info.exclude_pattern.is_empty() {
            fields.push(("exclude", info.exclude_pattern.clone()));
        }
        fields.push(("full_deadline", self.use_full_deadline.to_string()));
        fields
    }

    fn with_repos(&self, repos: &Arc<ScopedRepos>) -> Option<JobRef> {
        let mut job = self.clone();
        job.repos = Some(repos.clone());
        Some(Arc::new(job))
    }
}
