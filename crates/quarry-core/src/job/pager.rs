use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::{RepoOptions, RepoPage, RepoRevs};
use tracing::debug;

use super::{run_job, Job, JobRef, JobResult};
use crate::alert::max_alert;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::{SearchError, SearchResult};
use crate::query::YesNoOnly;
use crate::streaming::{SearchEvent, SharedSender, Stats};

/// One page of repositories, split by whether the indexed engine serves them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedRepos {
    pub indexed: Vec<RepoRevs>,
    pub unindexed: Vec<RepoRevs>,
}

impl ScopedRepos {
    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.unindexed.is_empty()
    }
}

/// Resolves the repository candidate set page by page and runs a
/// page-scoped copy of its child for each page.
///
/// Pages are processed one after another, so at most one page of
/// repositories is held at a time.
pub struct RepoPager {
    child: JobRef,
    repo_options: RepoOptions,
    use_index: YesNoOnly,
    contains_ref_globs: bool,
    page_size: usize,
}

impl RepoPager {
    pub fn new(
        child: JobRef,
        repo_options: RepoOptions,
        use_index: YesNoOnly,
        contains_ref_globs: bool,
        page_size: usize,
    ) -> JobRef {
        Arc::new(RepoPager {
            child,
            repo_options,
            use_index,
            contains_ref_globs,
            page_size,
        })
    }

    async fn partition(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        page: RepoPage,
        stats: &mut Stats,
    ) -> SearchResult<ScopedRepos> {
        if self.use_index == YesNoOnly::No || self.contains_ref_globs {
            return Ok(ScopedRepos {
                indexed: Vec::new(),
                unindexed: page.repos,
            });
        }

        let indexed_ids = ctx
            .run(clients.indexed.indexed_repos(&page.repos))
            .await?
            .map_err(|e| SearchError::from_backend("indexed", e))?;

        let mut scoped = ScopedRepos::default();
        for repo in page.repos {
            if indexed_ids.contains(&repo.repo.id) {
                scoped.indexed.push(repo);
            } else if self.use_index == YesNoOnly::Only {
                stats.skipped_unindexed.insert(repo.repo);
            } else {
                scoped.unindexed.push(repo);
            }
        }
        Ok(scoped)
    }
}

fn missing_rev_names(page: &RepoPage) -> Vec<String> {
    page.missing_revs
        .iter()
        .flat_map(|rr| rr.revs.iter().map(move |rev| format!("{}@{rev}", rr.repo.name)))
        .collect()
}

#[async_trait]
impl Job for RepoPager {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let mut cursor = None;
        let mut searched_any = false;
        // Missing revisions from pages with no repositories left to search.
        let mut pending_missing = Vec::new();
        let mut alert = None;

        loop {
            let page = ctx
                .run(clients.repos.resolve_page(&self.repo_options, cursor, self.page_size))
                .await?
                .map_err(|e| SearchError::from_backend("repos", e))?;
            let next = page.next;

            if page.repos.is_empty() {
                pending_missing.extend(missing_rev_names(&page));
            } else {
                searched_any = true;
                let mut stats = Stats {
                    missing_revs: std::mem::take(&mut pending_missing),
                    ..Default::default()
                };
                stats.missing_revs.extend(missing_rev_names(&page));
                let scoped = Arc::new(self.partition(ctx, clients, page, &mut stats).await?);
                if !stats.is_empty() {
                    stream.send(SearchEvent::stats(stats));
                }
                debug!(
                    indexed = scoped.indexed.len(),
                    unindexed = scoped.unindexed.len(),
                    "searching repository page"
                );

                if !scoped.is_empty() {
                    let job = self
                        .child
                        .with_repos(&scoped)
                        .unwrap_or_else(|| self.child.clone());
                    alert = max_alert(alert, run_job(job.as_ref(), ctx, clients, stream).await?);
                }
            }

            match next {
                Some(n) => cursor = Some(n),
                None => break,
            }
        }

        if !searched_any {
            if !pending_missing.is_empty() {
                return Err(SearchError::MissingRevisions(pending_missing));
            }
            if !self.repo_options.repo_filters.is_empty() {
                return Err(SearchError::NoRepositories);
            }
        } else if !pending_missing.is_empty() {
            stream.send(SearchEvent::stats(Stats {
                missing_revs: pending_missing,
                ..Default::default()
            }));
        }
        Ok(alert)
    }

    fn name(&self) -> &'static str {
        "RepoPager"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("repo_options", self.repo_options.describe()),
            ("index", self.use_index.as_str().to_string()),
        ];
        if self.contains_ref_globs {
            fields.push(("ref_globs", "true".to_string()));
        }
        fields
    }
}
