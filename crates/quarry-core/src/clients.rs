//! Backend handles shared by every job of a search

use std::sync::Arc;

use quarry_backend::fakes::{MemoryBackend, StaticPermissions};
use quarry_backend::{
    CommitSearcher, IndexedSearcher, RepoResolver, SubRepoPermissionChecker, SymbolSearcher,
    UnindexedSearcher,
};

#[derive(Clone)]
pub struct Clients {
    pub indexed: Arc<dyn IndexedSearcher>,
    pub searcher: Arc<dyn UnindexedSearcher>,
    pub symbols: Arc<dyn SymbolSearcher>,
    pub commits: Arc<dyn CommitSearcher>,
    pub repos: Arc<dyn RepoResolver>,
    pub permissions: Arc<dyn SubRepoPermissionChecker>,
}

impl Clients {
    /// Every backend served by one in-memory corpus, with no sub-repository
    /// permissions.
    pub fn from_memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            indexed: backend.clone(),
            searcher: backend.clone(),
            symbols: backend.clone(),
            commits: backend.clone(),
            repos: backend,
            permissions: Arc::new(StaticPermissions::new()),
        }
    }

    pub fn with_indexed(mut self, indexed: Arc<dyn IndexedSearcher>) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_searcher(mut self, searcher: Arc<dyn UnindexedSearcher>) -> Self {
        self.searcher = searcher;
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<dyn SymbolSearcher>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_commits(mut self, commits: Arc<dyn CommitSearcher>) -> Self {
        self.commits = commits;
        self
    }

    pub fn with_repos(mut self, repos: Arc<dyn RepoResolver>) -> Self {
        self.repos = repos;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn SubRepoPermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("permissions_enabled", &self.permissions.enabled())
            .finish_non_exhaustive()
    }
}
