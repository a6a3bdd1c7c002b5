//! Repository references, revision specs and resolution filters
//!
//! Provides:
//! - `RepoRef` / `RepoRevs`: a repository and the revisions to search in it
//! - `RepoFilter`: a parsed `pattern@rev1:rev2` repository filter
//! - `RepoOptions`: the filter criteria handed to a `RepoResolver`
//! - `RepoPage` / `ExcludedRepos`: resolution results

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository known to the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub id: u32,
    pub name: String,
}

impl RepoRef {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A repository together with the revisions to search.
///
/// An empty `revs` list means the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRevs {
    pub repo: RepoRef,
    #[serde(default)]
    pub revs: Vec<String>,
}

impl RepoRevs {
    pub fn new(repo: RepoRef, revs: Vec<String>) -> Self {
        Self { repo, revs }
    }

    /// The repository at its default branch.
    pub fn default_branch(repo: RepoRef) -> Self {
        Self {
            repo,
            revs: Vec::new(),
        }
    }

    /// Revisions to search, with the default branch spelled `HEAD`.
    pub fn revs_or_head(&self) -> Vec<String> {
        if self.revs.is_empty() {
            vec!["HEAD".to_string()]
        } else {
            self.revs.clone()
        }
    }

    /// True when only the default branch is requested.
    pub fn only_default_branch(&self) -> bool {
        self.revs.iter().all(|r| r.is_empty() || r == "HEAD")
    }

    /// True when any revision is a ref glob (`*refs/heads/*`, `*!refs/tags/*`).
    pub fn has_rev_globs(&self) -> bool {
        self.revs.iter().any(|r| is_rev_glob(r))
    }
}

/// Whether a revision spec is a ref glob rather than a concrete revision.
pub fn is_rev_glob(rev: &str) -> bool {
    rev.starts_with('*')
}

/// A `repo:` filter value split into its name pattern and revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFilter {
    pub pattern: String,
    pub revs: Vec<String>,
}

impl RepoFilter {
    /// Parse `pattern@rev1:rev2`. A missing `@` part yields no revisions.
    pub fn parse(value: &str) -> Self {
        match value.split_once('@') {
            Some((pattern, revs)) => Self {
                pattern: pattern.to_string(),
                revs: revs
                    .split(':')
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            None => Self {
                pattern: value.to_string(),
                revs: Vec::new(),
            },
        }
    }

    pub fn has_rev_globs(&self) -> bool {
        self.revs.iter().any(|r| is_rev_glob(r))
    }
}

/// Repository visibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Any,
    Public,
    Private,
}

impl Visibility {
    /// Parse a `visibility:` value. Unknown values mean `Any`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "public" => Visibility::Public,
            "private" => Visibility::Private,
            _ => Visibility::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Any => "any",
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Repository filter criteria, computed once per query and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOptions {
    /// Positive `repo:` values, possibly carrying `@revs`
    #[serde(default)]
    pub repo_filters: Vec<String>,
    /// Negated `-repo:` patterns
    #[serde(default)]
    pub minus_repo_filters: Vec<String>,
    #[serde(default)]
    pub case_sensitive_repo_filters: bool,
    /// Search context spec; empty or `global` means all repositories
    #[serde(default)]
    pub search_context_spec: String,
    #[serde(default)]
    pub only_forks: bool,
    #[serde(default)]
    pub no_forks: bool,
    #[serde(default)]
    pub only_archived: bool,
    #[serde(default)]
    pub no_archived: bool,
    #[serde(default)]
    pub visibility: Visibility,
    /// `repohascommitafter:` value (`YYYY-MM-DD` or RFC 3339)
    #[serde(default)]
    pub commit_after: Option<String>,
    /// `repohasfile:` path patterns
    #[serde(default)]
    pub has_file: Vec<String>,
    /// Negated `-repohasfile:` path patterns
    #[serde(default)]
    pub minus_has_file: Vec<String>,
}

impl RepoOptions {
    /// Parsed positive filters.
    pub fn filters(&self) -> Vec<RepoFilter> {
        self.repo_filters.iter().map(|f| RepoFilter::parse(f)).collect()
    }

    pub fn has_rev_globs(&self) -> bool {
        self.filters().iter().any(RepoFilter::has_rev_globs)
    }

    pub fn is_global_context(&self) -> bool {
        self.search_context_spec.is_empty() || self.search_context_spec == "global"
    }

    /// Compact `key:value` rendering used when printing job trees.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for f in &self.repo_filters {
            parts.push(format!("repo:{f}"));
        }
        for f in &self.minus_repo_filters {
            parts.push(format!("-repo:{f}"));
        }
        if !self.is_global_context() {
            parts.push(format!("context:{}", self.search_context_spec));
        }
        if self.case_sensitive_repo_filters {
            parts.push("case:yes".to_string());
        }
        if self.only_forks {
            parts.push("fork:only".to_string());
        } else if !self.no_forks {
            parts.push("fork:yes".to_string());
        }
        if self.only_archived {
            parts.push("archived:only".to_string());
        } else if !self.no_archived {
            parts.push("archived:yes".to_string());
        }
        if self.visibility != Visibility::Any {
            parts.push(format!("visibility:{}", self.visibility.as_str()));
        }
        if let Some(after) = &self.commit_after {
            parts.push(format!("repohascommitafter:{after}"));
        }
        for f in &self.has_file {
            parts.push(format!("repohasfile:{f}"));
        }
        for f in &self.minus_has_file {
            parts.push(format!("-repohasfile:{f}"));
        }
        parts.join(" ")
    }
}

/// One page of resolved repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPage {
    pub repos: Vec<RepoRevs>,
    /// Requested revisions that do not exist
    #[serde(default)]
    pub missing_revs: Vec<RepoRevs>,
    /// Cursor for the next page, `None` on the last page
    #[serde(default)]
    pub next: Option<u32>,
}

/// Counts of repositories dropped by the default fork/archived exclusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRepos {
    pub forks: usize,
    pub archived: usize,
}
