use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::{BackendError, PatternInfo, SymbolRequest};

use super::{fan_out, rev_of};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::job::{Job, JobRef, JobResult, ScopedRepos};
use crate::result::{FileMatch, Match, SymbolMatch};
use crate::streaming::{SearchEvent, SharedSender, Stats};

/// Symbol search on unindexed repositories of one page.
#[derive(Clone)]
pub struct SymbolSearcherJob {
    pattern_info: Arc<PatternInfo>,
    limit: usize,
    concurrency: usize,
    repos: Option<Arc<ScopedRepos>>,
}

impl SymbolSearcherJob {
    pub fn new(pattern_info: PatternInfo, limit: usize, concurrency: usize) -> JobRef {
        Arc::new(SymbolSearcherJob {
            pattern_info: Arc::new(pattern_info),
            limit,
            concurrency,
            repos: None,
        })
    }
}

async fn search_repo(
    ctx: SearchContext,
    clients: Clients,
    stream: SharedSender,
    request: SymbolRequest,
) -> SearchResult<()> {
    let repo = request.repo.clone();
    let mut stats = Stats::default();
    match ctx.run(clients.symbols.search(&request)).await? {
        Ok(records) => {
            let mut by_path: BTreeMap<String, Vec<SymbolMatch>> = BTreeMap::new();
            for r in records {
                by_path.entry(r.path).or_default().push(SymbolMatch {
                    name: r.name,
                    kind: r.kind,
                    line: r.line,
                });
            }
            let results = by_path
                .into_iter()
                .map(|(path, symbols)| {
                    Match::File(FileMatch {
                        repo: repo.clone(),
                        rev: rev_of(&request.commit),
                        commit: request.commit.clone(),
                        path,
                        line_matches: Vec::new(),
                        symbols,
                        limit_hit: false,
                    })
                })
                .collect();
            stats.repos.insert(repo);
            stream.send(SearchEvent { results, stats });
        }
        Err(BackendError::RepoNotFound(_) | BackendError::RevisionNotFound { .. }) => {
            stats
                .missing_revs
                .push(format!("{}@{}", repo.name, request.commit));
            stream.send(SearchEvent::stats(stats));
        }
        Err(e) => return Err(SearchError::from_backend("symbols", e)),
    }
    Ok(())
}

#[async_trait]
impl Job for SymbolSearcherJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let Some(scoped) = &self.repos else {
            return Ok(None);
        };
        let info = &self.pattern_info;
        let requests: Vec<SymbolRequest> = scoped
            .unindexed
            .iter()
            .flat_map(|repo| {
                repo.revs_or_head().into_iter().map(|rev| SymbolRequest {
                    repo: repo.repo.clone(),
                    commit: rev,
                    pattern: info.pattern.clone(),
                    is_regexp: info.is_regexp,
                    is_case_sensitive: info.is_case_sensitive,
                    include_patterns: info.include_patterns.clone(),
                    exclude_pattern: info.exclude_pattern.clone(),
                    first: self.limit,
                })
            })
            .collect();
        if requests.is_empty() {
            return Ok(None);
        }

        fan_out(ctx, requests, self.concurrency, |repo_ctx, request| {
            search_repo(repo_ctx, clients.clone(), stream.clone(), request)
        })
        .await?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "SymbolSearcherJob"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pattern", format!("{:?}", self.pattern_info.pattern)),
            ("limit", self.limit.to_string()),
        ]
    }

    fn with_repos(&self, repos: &Arc<ScopedRepos>) -> Option<JobRef> {
        let mut job = self.clone();
        job.repos = Some(repos.clone());
        Some(Arc::new(job))
    }
}
