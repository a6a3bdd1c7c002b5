use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::{
    IndexedKind, IndexedQuery, IndexedSearchBatch, IndexedSearchOptions, RepoOptions,
};

use super::{from_indexed, rev_of};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::job::{Job, JobRef, JobResult, ScopedRepos};
use crate::result::Match;
use crate::streaming::{SearchEvent, SharedSender, Stats};

fn batch_event(batch: IndexedSearchBatch, revs: &BTreeMap<u32, String>) -> SearchEvent {
    let mut stats = Stats {
        is_limit_hit: batch.limit_hit,
        ..Default::default()
    };
    let results = batch
        .files
        .into_iter()
        .map(|file| {
            stats.repos.insert(file.repo.clone());
            let rev = revs.get(&file.repo.id).cloned();
            Match::File(from_indexed(file, rev))
        })
        .collect();
    SearchEvent { results, stats }
}

async fn search(
    ctx: &SearchContext,
    clients: &Clients,
    stream: &SharedSender,
    query: &IndexedQuery,
    opts: &IndexedSearchOptions,
    revs: &BTreeMap<u32, String>,
) -> JobResult {
    let on_batch = |batch: IndexedSearchBatch| stream.send(batch_event(batch, revs));
    ctx.run(clients.indexed.search(query, opts, &on_batch))
        .await?
        .map_err(|e| SearchError::from_backend("indexed", e))?;
    Ok(None)
}

/// Search over every indexed repository in one indexed-engine query.
///
/// The scope restricts the query to repositories the default filters allow.
/// Private repositories the actor can see are resolved at run time and added
/// to the scope as an explicit repository set.
pub struct GlobalIndexedSearch {
    kind: IndexedKind,
    query: IndexedQuery,
    scope: IndexedQuery,
    include_private: bool,
    repo_options: RepoOptions,
    opts: IndexedSearchOptions,
}

impl GlobalIndexedSearch {
    pub fn new(
        query: IndexedQuery,
        scope: IndexedQuery,
        include_private: bool,
        repo_options: RepoOptions,
        opts: IndexedSearchOptions,
    ) -> JobRef {
        Arc::new(GlobalIndexedSearch {
            kind: opts.kind,
            query,
            scope,
            include_private,
            repo_options,
            opts,
        })
    }
}

#[async_trait]
impl Job for GlobalIndexedSearch {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let mut scope = self.scope.clone();
        if self.include_private {
            let private = ctx
                .run(clients.repos.private_repos(&self.repo_options))
                .await?
                .map_err(|e| SearchError::from_backend("repos", e))?;
            if !private.is_empty() {
                let names: BTreeSet<String> = private.into_iter().map(|r| r.name).collect();
                scope = IndexedQuery::or(vec![scope, IndexedQuery::RepoSet(names)]);
            }
        }
        let query = IndexedQuery::and(vec![self.query.clone(), scope]);
        search(ctx, clients, stream, &query, &self.opts, &BTreeMap::new()).await
    }

    fn name(&self) -> &'static str {
        match self.kind {
            IndexedKind::Text => "GlobalTextSearch",
            IndexedKind::Symbol => "GlobalSymbolSearch",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("query", self.query.to_string()),
            ("scope", self.scope.to_string()),
            ("include_private", self.include_private.to_string()),
            ("file_match_limit", self.opts.file_match_limit.to_string()),
        ];
        if let Some(select) = &self.opts.select {
            fields.push(("select", select.clone()));
        }
        fields
    }
}

/// Indexed-engine search restricted to the indexed repositories of one page.
pub struct IndexedSubsetSearch {
    query: IndexedQuery,
    opts: IndexedSearchOptions,
    repos: Option<Arc<ScopedRepos>>,
}

impl IndexedSubsetSearch {
    pub fn new(query: IndexedQuery, opts: IndexedSearchOptions) -> JobRef {
        Arc::new(IndexedSubsetSearch {
            query,
            opts,
            repos: None,
        })
    }
}

#[async_trait]
impl Job for IndexedSubsetSearch {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let Some(scoped) = &self.repos else {
            return Ok(None);
        };
        if scoped.indexed.is_empty() {
            return Ok(None);
        }

        let mut by_rev: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut revs = BTreeMap::new();
        for repo in &scoped.indexed {
            let repo_revs = repo.revs_or_head();
            if let [single] = repo_revs.as_slice() {
                if let Some(rev) = rev_of(single) {
                    revs.insert(repo.repo.id, rev);
                }
            }
            for rev in repo_revs {
                by_rev
                    .entry(rev)
                    .or_default()
                    .insert(repo.repo.name.clone());
            }
        }
        let scope = IndexedQuery::or(
            by_rev
                .into_iter()
                .map(|(rev, names)| {
                    IndexedQuery::and(vec![IndexedQuery::RepoSet(names), IndexedQuery::Branch(rev)])
                })
                .collect(),
        );
        let query = IndexedQuery::and(vec![self.query.clone(), scope]);
        search(ctx, clients, stream, &query, &self.opts, &revs).await
    }

    fn name(&self) -> &'static str {
        match self.opts.kind {
            IndexedKind::Text => "IndexedSubsetTextSearch",
            IndexedKind::Symbol => "IndexedSubsetSymbolSearch",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("query", self.query.to_string()),
            ("file_match_limit", self.opts.file_match_limit.to_string()),
        ]
    }

    fn with_repos(&self, repos: &Arc<ScopedRepos>) -> Option<JobRef> {
        Some(Arc::new(IndexedSubsetSearch {
            query: self.query.clone(),
            opts: self.opts.clone(),
            repos: Some(repos.clone()),
        }))
    }
}
