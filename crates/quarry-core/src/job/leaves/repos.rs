use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::RepoOptions;

use super::rev_of;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::job::{Job, JobRef, JobResult};
use crate::result::{Match, RepoMatch};
use crate::streaming::{SearchEvent, SharedSender, Stats};

/// Which repositories a repository search may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoSearchMode {
    /// Every repository the options select
    Default,
    /// The search as a whole runs on the indexed engine's universe
    IndexedGlobal,
    /// Only indexed repositories; unindexed search is skipped
    SkipUnindexed,
}

impl RepoSearchMode {
    fn as_str(&self) -> &'static str {
        match self {
            RepoSearchMode::Default => "default",
            RepoSearchMode::IndexedGlobal => "indexed-global",
            RepoSearchMode::SkipUnindexed => "skip-unindexed",
        }
    }
}

/// Emits one repository match per resolved repository revision.
pub struct RepoSearchJob {
    repo_options: RepoOptions,
    mode: RepoSearchMode,
    page_size: usize,
}

impl RepoSearchJob {
    pub fn new(repo_options: RepoOptions, mode: RepoSearchMode, page_size: usize) -> JobRef {
        Arc::new(RepoSearchJob {
            repo_options,
            mode,
            page_size,
        })
    }
}

#[async_trait]
impl Job for RepoSearchJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let mut cursor = None;
        loop {
            let page = ctx
                .run(clients.repos.resolve_page(&self.repo_options, cursor, self.page_size))
                .await?
                .map_err(|e| SearchError::from_backend("repos", e))?;

            let indexed: Option<BTreeSet<u32>> = match self.mode {
                RepoSearchMode::SkipUnindexed => Some(
                    ctx.run(clients.indexed.indexed_repos(&page.repos))
                        .await?
                        .map_err(|e| SearchError::from_backend("indexed", e))?,
                ),
                _ => None,
            };

            let mut stats = Stats::default();
            let mut results = Vec::new();
            for repo in &page.repos {
                if indexed.as_ref().is_some_and(|ids| !ids.contains(&repo.repo.id)) {
                    continue;
                }
                stats.repos.insert(repo.repo.clone());
                for rev in repo.revs_or_head() {
                    results.push(Match::Repo(RepoMatch {
                        repo: repo.repo.clone(),
                        rev: rev_of(&rev),
                    }));
                }
            }
            stream.send(SearchEvent { results, stats });

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "RepoSearch"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("repo_options", self.repo_options.describe()),
            ("mode", self.mode.as_str().to_string()),
        ]
    }
}

/// Counts repositories hidden by the default fork and archived exclusion.
pub struct ComputeExcludedRepos {
    repo_options: RepoOptions,
}

impl ComputeExcludedRepos {
    pub fn new(repo_options: RepoOptions) -> JobRef {
        Arc::new(ComputeExcludedRepos { repo_options })
    }
}

#[async_trait]
impl Job for ComputeExcludedRepos {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let excluded = ctx
            .run(clients.repos.excluded(&self.repo_options))
            .await?
            .map_err(|e| SearchError::from_backend("repos", e))?;
        stream.send(SearchEvent::stats(Stats {
            excluded,
            ..Default::default()
        }));
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "ComputeExcludedRepos"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("repo_options", self.repo_options.describe())]
    }
}
