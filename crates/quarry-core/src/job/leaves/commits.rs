use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::{
    BackendError, CommitQuery, CommitSearchRequest, RawCommit, RepoOptions, RepoRef, RepoRevs,
};

use super::fan_out;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::job::{Job, JobRef, JobResult};
use crate::result::{CommitMatch, Match};
use crate::streaming::{SearchEvent, SharedSender, Stats};

/// Commit or diff search over every repository the options select.
///
/// Resolves its own repositories page by page; the commit backend is asked
/// once per repository with all requested revisions.
pub struct CommitSearchJob {
    query: CommitQuery,
    repo_options: RepoOptions,
    diff: bool,
    has_time_filter: bool,
    limit: usize,
    include_modified_files: bool,
    page_size: usize,
    concurrency: usize,
}

impl CommitSearchJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query: CommitQuery,
        repo_options: RepoOptions,
        diff: bool,
        has_time_filter: bool,
        limit: usize,
        include_modified_files: bool,
        page_size: usize,
        concurrency: usize,
    ) -> JobRef {
        Arc::new(CommitSearchJob {
            query,
            repo_options,
            diff,
            has_time_filter,
            limit,
            include_modified_files,
            page_size,
            concurrency,
        })
    }
}

fn to_match(repo: &RepoRef, commit: RawCommit) -> Match {
    Match::Commit(CommitMatch {
        repo: repo.clone(),
        oid: commit.oid,
        author: commit.author,
        committer: commit.committer,
        message: commit.message,
        diff: commit.diff,
        modified_files: commit.modified_files,
    })
}

async fn search_repo(
    ctx: SearchContext,
    clients: Clients,
    stream: SharedSender,
    request: CommitSearchRequest,
) -> SearchResult<()> {
    let repo = request.repo.repo.clone();
    let on_matches = |commits: Vec<RawCommit>| {
        let results = commits.into_iter().map(|c| to_match(&repo, c)).collect();
        stream.send(SearchEvent::results(results));
    };

    let mut stats = Stats::default();
    match ctx.run(clients.commits.search(&request, &on_matches)).await? {
        Ok(limit_hit) => {
            stats.is_limit_hit = limit_hit;
            stats.repos.insert(repo.clone());
        }
        Err(BackendError::RepoNotFound(_)) => {
            stats.missing_revs.push(repo.name.clone());
        }
        Err(BackendError::RevisionNotFound { rev, .. }) => {
            stats.missing_revs.push(format!("{}@{rev}", repo.name));
        }
        Err(e) => return Err(SearchError::from_backend("commits", e)),
    }
    stream.send(SearchEvent::stats(stats));
    Ok(())
}

#[async_trait]
impl Job for CommitSearchJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let mut cursor = None;
        loop {
            let page = ctx
                .run(clients.repos.resolve_page(&self.repo_options, cursor, self.page_size))
                .await?
                .map_err(|e| SearchError::from_backend("repos", e))?;

            let missing: Vec<String> = page
                .missing_revs
                .iter()
                .flat_map(|rr| rr.revs.iter().map(move |rev| format!("{}@{rev}", rr.repo.name)))
                .collect();
            if !missing.is_empty() {
                stream.send(SearchEvent::stats(Stats {
                    missing_revs: missing,
                    ..Default::default()
                }));
            }

            let requests: Vec<CommitSearchRequest> = page
                .repos
                .into_iter()
                .map(|repo: RepoRevs| CommitSearchRequest {
                    repo,
                    query: self.query.clone(),
                    include_diff: self.diff,
                    include_modified_files: self.include_modified_files,
                    limit: self.limit,
                })
                .collect();
            fan_out(ctx, requests, self.concurrency, |repo_ctx, request| {
                search_repo(repo_ctx, clients.clone(), stream.clone(), request)
            })
            .await?;

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        if self.diff {
            "DiffSearch"
        } else {
            "CommitSearch"
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("query", self.query.describe()),
            ("repo_options", self.repo_options.describe()),
            ("limit", self.limit.to_string()),
        ];
        if self.has_time_filter {
            fields.push(("has_time_filter", "true".to_string()));
        }
        if self.include_modified_files {
            fields.push(("include_modified_files", "true".to_string()));
        }
        fields
    }
}
