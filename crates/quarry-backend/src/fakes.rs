//! In-memory fakes for backend traits (testing and local runs)
//!
//! Provides `MemoryBackend`, which serves every search backend and the
//! repository resolver from a `Corpus` of in-memory repositories, plus
//! `StaticPermissions` and `FailingBackend`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::commits::{CommitQuery, CommitSearchRequest, RawCommit};
use crate::error::{BackendError, BackendResult};
use crate::indexed::{
    IndexedFileMatch, IndexedKind, IndexedLineMatch, IndexedQuery, IndexedSearchBatch,
    IndexedSearchOptions, IndexedSymbol, RawConfig,
};
use crate::matcher::{Archive, ArchiveFile, Matcher};
use crate::protocol::{FileMatch, SearcherRequest, SymbolRecord, SymbolRequest};
use crate::repos::{
    is_rev_glob, ExcludedRepos, RepoFilter, RepoOptions, RepoPage, RepoRef, RepoRevs, Visibility,
};
use crate::traits::{
    Actor, CommitSearcher, IndexedSearcher, RepoResolver, SubRepoPermissionChecker,
    SymbolSearcher, UnindexedSearcher,
};

fn default_true() -> bool {
    true
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string()]
}

/// Language name for a path, by extension.
pub fn language_of(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "go" => "Go",
        "rs" => "Rust",
        "py" => "Python",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" => "JavaScript",
        "java" => "Java",
        "c" | "h" => "C",
        "md" | "markdown" => "Markdown",
        "txt" => "Text",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        _ => "",
    }
}

/// A repository served from memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRepo {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_true")]
    pub indexed: bool,
    /// Branches other than `HEAD`, which always exists
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub symbols: Vec<SymbolRecord>,
    #[serde(default)]
    pub commits: Vec<RawCommit>,
    #[serde(default)]
    pub last_commit_at: Option<DateTime<Utc>>,
}

impl MemoryRepo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            indexed: true,
            branches: default_branches(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_symbol(mut self, name: &str, kind: &str, path: &str, line: u32) -> Self {
        self.symbols.push(SymbolRecord {
            name: name.to_string(),
            kind: kind.to_string(),
            path: path.to_string(),
            line,
            language: language_of(path).to_string(),
            parent: String::new(),
        });
        self
    }

    pub fn with_commit(mut self, commit: RawCommit) -> Self {
        let date = commit.committer.date;
        if self.last_commit_at.map_or(true, |d| d < date) {
            self.last_commit_at = Some(date);
        }
        self.commits.push(commit);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branches.push(branch.into());
        self
    }

    pub fn fork(mut self) -> Self {
        self.fork = true;
        self
    }

    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.id, self.name.clone())
    }

    /// Head commit id, or a zero id for repositories without history.
    pub fn head(&self) -> String {
        self.commits
            .first()
            .map(|c| c.oid.clone())
            .unwrap_or_else(|| "0".repeat(40))
    }

    pub fn has_rev(&self, rev: &str) -> bool {
        rev.is_empty()
            || rev == "HEAD"
            || self.branches.iter().any(|b| b == rev)
            || (rev.len() >= 7 && self.commits.iter().any(|c| c.oid.starts_with(rev)))
    }

    /// Branches matching a `*glob` revision, tried against both the bare
    /// branch name and its `refs/heads/` form.
    pub fn expand_rev_glob(&self, rev: &str) -> BackendResult<Vec<String>> {
        let pattern = rev.trim_start_matches('*');
        let matcher = globset::Glob::new(pattern)?.compile_matcher();
        Ok(self
            .branches
            .iter()
            .filter(|b| matcher.is_match(b.as_str()) || matcher.is_match(format!("refs/heads/{b}")))
            .cloned()
            .collect())
    }

    pub fn archive(&self) -> Archive {
        Archive::new(
            self.files
                .iter()
                .map(|(p, c)| ArchiveFile::new(p.clone(), c.as_bytes().to_vec()))
                .collect(),
        )
    }
}

/// A serializable set of repositories and search contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub repos: Vec<MemoryRepo>,
    /// Search context name to the repository names it contains
    #[serde(default)]
    pub contexts: BTreeMap<String, Vec<String>>,
}

struct CompiledOptions {
    include: Vec<(Regex, Vec<String>)>,
    exclude: Vec<Regex>,
    context: Option<BTreeSet<String>>,
    has_file: Vec<Regex>,
    minus_has_file: Vec<Regex>,
    commit_after: Option<DateTime<Utc>>,
}

enum Verdict {
    Selected(Vec<String>),
    ExcludedFork,
    ExcludedArchived,
    Rejected,
}

/// Every backend trait served from an in-memory corpus.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    corpus: Corpus,
    calls: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new(repos: Vec<MemoryRepo>) -> Self {
        Self::from_corpus(Corpus {
            repos,
            contexts: BTreeMap::new(),
        })
    }

    pub fn from_corpus(mut corpus: Corpus) -> Self {
        corpus.repos.sort_by_key(|r| r.id);
        Self {
            corpus,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context(mut self, name: &str, repos: &[&str]) -> Self {
        self.corpus.contexts.insert(
            name.to_string(),
            repos.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn repos(&self) -> &[MemoryRepo] {
        &self.corpus.repos
    }

    /// Calls made so far, e.g. `searcher:github.com/a/b@HEAD`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn find(&self, name: &str) -> BackendResult<&MemoryRepo> {
        self.corpus
            .repos
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| BackendError::RepoNotFound(name.to_string()))
    }

    fn compile_options(&self, opts: &RepoOptions) -> BackendResult<CompiledOptions> {
        let ci = !opts.case_sensitive_repo_filters;
        let include = opts
            .filters()
            .into_iter()
            .map(|f: RepoFilter| -> BackendResult<(Regex, Vec<String>)> {
                Ok((build_regex(&f.pattern, ci)?, f.revs))
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let exclude = opts
            .minus_repo_filters
            .iter()
            .map(|p| build_regex(p, ci))
            .collect::<BackendResult<Vec<_>>>()?;
        let context = if opts.is_global_context() {
            None
        } else {
            let name = opts.search_context_spec.as_str();
            let repos = self.corpus.contexts.get(name).ok_or_else(|| {
                BackendError::BadRequest(format!("search context {name:?} not found"))
            })?;
            Some(repos.iter().cloned().collect())
        };
        let has_file = opts
            .has_file
            .iter()
            .map(|p| build_regex(p, true))
            .collect::<BackendResult<Vec<_>>>()?;
        let minus_has_file = opts
            .minus_has_file
            .iter()
            .map(|p| build_regex(p, true))
            .collect::<BackendResult<Vec<_>>>()?;
        let commit_after = opts.commit_after.as_deref().map(parse_date).transpose()?;
        Ok(CompiledOptions {
            include,
            exclude,
            context,
            has_file,
            minus_has_file,
            commit_after,
        })
    }

    fn judge(&self, c: &CompiledOptions, opts: &RepoOptions, repo: &MemoryRepo) -> Verdict {
        let mut revs = BTreeSet::new();
        let mut default_branch = c.include.is_empty();
        for (re, filter_revs) in &c.include {
            if !re.is_match(&repo.name) {
                return Verdict::Rejected;
            }
            if filter_revs.is_empty() {
                default_branch = true;
            }
            revs.extend(filter_revs.iter().cloned());
        }
        if c.exclude.iter().any(|re| re.is_match(&repo.name)) {
            return Verdict::Rejected;
        }
        if c.context.as_ref().is_some_and(|ctx| !ctx.contains(&repo.name)) {
            return Verdict::Rejected;
        }
        match opts.visibility {
            Visibility::Public if repo.private => return Verdict::Rejected,
            Visibility::Private if !repo.private => return Verdict::Rejected,
            _ => {}
        }
        if let Some(after) = c.commit_after {
            if repo.last_commit_at.map_or(true, |d| d <= after) {
                return Verdict::Rejected;
            }
        }
        let has = |re: &Regex| repo.files.keys().any(|p| re.is_match(p));
        if !c.has_file.iter().all(has) || c.minus_has_file.iter().any(has) {
            return Verdict::Rejected;
        }
        if (opts.only_forks && !repo.fork) || (opts.only_archived && !repo.archived) {
            return Verdict::Rejected;
        }
        if opts.no_forks && repo.fork {
            return Verdict::ExcludedFork;
        }
        if opts.no_archived && repo.archived {
            return Verdict::ExcludedArchived;
        }
        if default_branch && !revs.is_empty() {
            revs.insert("HEAD".to_string());
        }
        Verdict::Selected(revs.into_iter().collect())
    }
}

fn build_regex(pattern: &str, case_insensitive: bool) -> BackendResult<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .multi_line(true)
        .build()?)
}

fn parse_date(value: &str) -> BackendResult<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| BackendError::BadRequest(format!("invalid date {value:?}")))
}

fn contains(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

struct EvalCtx<'a> {
    repo: &'a MemoryRepo,
    path: &'a str,
    content: &'a str,
    symbol: Option<&'a SymbolRecord>,
}

fn atom_hit(
    regexp: bool,
    pattern: &str,
    case_sensitive: bool,
    file_name: bool,
    content: bool,
    ctx: &EvalCtx<'_>,
    in_symbol: bool,
) -> BackendResult<bool> {
    let test = |text: &str| -> BackendResult<bool> {
        if regexp {
            Ok(build_regex(pattern, !case_sensitive)?.is_match(text))
        } else {
            Ok(contains(text, pattern, case_sensitive))
        }
    };
    if in_symbol {
        return match ctx.symbol {
            Some(sym) => test(&sym.name),
            None => Ok(false),
        };
    }
    let (file_name, content) = if !file_name && !content {
        (true, true)
    } else {
        (file_name, content)
    };
    Ok((file_name && test(ctx.path)?) || (content && test(ctx.content)?))
}

fn raw_config_allows(c: &RawConfig, repo: &MemoryRepo) -> bool {
    !(c.only_public && repo.private
        || c.only_private && !repo.private
        || c.only_forks && !repo.fork
        || c.no_forks && repo.fork
        || c.only_archived && !repo.archived
        || c.no_archived && repo.archived)
}

fn eval(q: &IndexedQuery, ctx: &EvalCtx<'_>, in_symbol: bool) -> BackendResult<bool> {
    Ok(match q {
        IndexedQuery::Const(v) => *v,
        IndexedQuery::Substring {
            pattern,
            case_sensitive,
            file_name,
            content,
        } => atom_hit(false, pattern, *case_sensitive, *file_name, *content, ctx, in_symbol)?,
        IndexedQuery::Regexp {
            pattern,
            case_sensitive,
            file_name,
            content,
        } => atom_hit(true, pattern, *case_sensitive, *file_name, *content, ctx, in_symbol)?,
        IndexedQuery::Symbol(inner) => eval(inner, ctx, true)?,
        IndexedQuery::Language(lang) => language_of(ctx.path).eq_ignore_ascii_case(lang),
        IndexedQuery::Branch(b) => ctx.repo.has_rev(b),
        IndexedQuery::RepoRegexp(r) => build_regex(r, false)?.is_match(&ctx.repo.name),
        IndexedQuery::RepoSet(set) => set.contains(&ctx.repo.name),
        IndexedQuery::RawConfig(c) => raw_config_allows(c, ctx.repo),
        IndexedQuery::And(children) => {
            for c in children {
                if !eval(c, ctx, in_symbol)? {
                    return Ok(false);
                }
            }
            true
        }
        IndexedQuery::Or(children) => {
            for c in children {
                if eval(c, ctx, in_symbol)? {
                    return Ok(true);
                }
            }
            false
        }
        IndexedQuery::Not(inner) => !eval(inner, ctx, in_symbol)?,
    })
}

/// Line hits of every positive content atom in `q`.
fn collect_lines(
    q: &IndexedQuery,
    content: &str,
    out: &mut BTreeMap<u32, IndexedLineMatch>,
) -> BackendResult<()> {
    match q {
        IndexedQuery::Substring {
            pattern,
            case_sensitive,
            content: on_content,
            file_name,
        }
        | IndexedQuery::Regexp {
            pattern,
            case_sensitive,
            content: on_content,
            file_name,
        } if *on_content || !*file_name => {
            let expr = match q {
                IndexedQuery::Regexp { .. } => pattern.clone(),
                _ => regex::escape(pattern),
            };
            let re = build_regex(&expr, !case_sensitive)?;
            for (idx, line) in content.lines().enumerate() {
                for m in re.find_iter(line) {
                    if m.start() == m.end() {
                        continue;
                    }
                    let entry = out.entry(idx as u32 + 1).or_insert_with(|| IndexedLineMatch {
                        line_number: idx as u32 + 1,
                        line: line.to_string(),
                        fragments: Vec::new(),
                    });
                    entry
                        .fragments
                        .push((m.start() as u32, (m.end() - m.start()) as u32));
                }
            }
        }
        IndexedQuery::And(children) | IndexedQuery::Or(children) => {
            for c in children {
                collect_lines(c, content, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[async_trait]
impl RepoResolver for MemoryBackend {
    async fn resolve_page(
        &self,
        opts: &RepoOptions,
        cursor: Option<u32>,
        limit: usize,
    ) -> BackendResult<RepoPage> {
        self.record(format!("resolve:{}", cursor.unwrap_or(0)));
        let compiled = self.compile_options(opts)?;
        let mut page = RepoPage::default();
        let mut taken = 0;
        for repo in self
            .corpus
            .repos
            .iter()
            .filter(|r| cursor.map_or(true, |c| r.id >= c))
        {
            let Verdict::Selected(revs) = self.judge(&compiled, opts, repo) else {
                continue;
            };
            if limit > 0 && taken == limit {
                page.next = Some(repo.id);
                break;
            }
            taken += 1;
            let requested_revs = !revs.is_empty();
            let mut expanded = Vec::new();
            for rev in revs {
                if is_rev_glob(&rev) {
                    expanded.extend(repo.expand_rev_glob(&rev)?);
                } else if !expanded.contains(&rev) {
                    expanded.push(rev);
                }
            }
            let (present, missing): (Vec<String>, Vec<String>) =
                expanded.into_iter().partition(|r| repo.has_rev(r));
            if !missing.is_empty() {
                page.missing_revs.push(RepoRevs::new(repo.repo_ref(), missing));
                if present.is_empty() {
                    continue;
                }
            }
            if requested_revs && present.is_empty() {
                continue;
            }
            page.repos.push(RepoRevs::new(repo.repo_ref(), present));
        }
        Ok(page)
    }

    async fn excluded(&self, opts: &RepoOptions) -> BackendResult<ExcludedRepos> {
        self.record("excluded".to_string());
        let compiled = self.compile_options(opts)?;
        let mut excluded = ExcludedRepos::default();
        for repo in &self.corpus.repos {
            match self.judge(&compiled, opts, repo) {
                Verdict::ExcludedFork => excluded.forks += 1,
                Verdict::ExcludedArchived => excluded.archived += 1,
                _ => {}
            }
        }
        Ok(excluded)
    }

    async fn private_repos(&self, opts: &RepoOptions) -> BackendResult<Vec<RepoRef>> {
        let compiled = self.compile_options(opts)?;
        Ok(self
            .corpus
            .repos
            .iter()
            .filter(|r| r.private)
            .filter(|r| matches!(self.judge(&compiled, opts, r), Verdict::Selected(_)))
            .map(MemoryRepo::repo_ref)
            .collect())
    }
}

#[async_trait]
impl IndexedSearcher for MemoryBackend {
    async fn search(
        &self,
        query: &IndexedQuery,
        opts: &IndexedSearchOptions,
        on_batch: &(dyn Fn(IndexedSearchBatch) + Send + Sync),
    ) -> BackendResult<()> {
        self.record(format!(
            "indexed:{}",
            match opts.kind {
                IndexedKind::Text => "text",
                IndexedKind::Symbol => "symbol",
            }
        ));
        let mut remaining = if opts.file_match_limit == 0 {
            usize::MAX
        } else {
            opts.file_match_limit
        };
        for repo in self.corpus.repos.iter().filter(|r| r.indexed) {
            let mut batch = IndexedSearchBatch::default();
            for (path, content) in &repo.files {
                if remaining == 0 {
                    batch.limit_hit = true;
                    break;
                }
                let base = EvalCtx {
                    repo,
                    path,
                    content,
                    symbol: None,
                };
                let file = match opts.kind {
                    IndexedKind::Text => {
                        if !eval(query, &base, false)? {
                            continue;
                        }
                        let mut lines = BTreeMap::new();
                        collect_lines(query, content, &mut lines)?;
                        indexed_file(repo, path, lines.into_values().collect(), Vec::new())
                    }
                    IndexedKind::Symbol => {
                        let mut symbols = Vec::new();
                        for sym in repo.symbols.iter().filter(|s| &s.path == path) {
                            let ctx = EvalCtx {
                                symbol: Some(sym),
                                ..base
                            };
                            if eval(query, &ctx, false)? {
                                symbols.push(IndexedSymbol {
                                    name: sym.name.clone(),
                                    kind: sym.kind.clone(),
                                    line_number: sym.line + 1,
                                });
                            }
                        }
                        if symbols.is_empty() {
                            continue;
                        }
                        indexed_file(repo, path, Vec::new(), symbols)
                    }
                };
                batch.files.push(file);
                remaining -= 1;
            }
            let stop = batch.limit_hit;
            if !batch.files.is_empty() || stop {
                on_batch(batch);
            }
            if stop {
                break;
            }
        }
        Ok(())
    }

    async fn indexed_repos(&self, repos: &[RepoRevs]) -> BackendResult<BTreeSet<u32>> {
        Ok(repos
            .iter()
            .filter(|rr| {
                self.corpus.repos.iter().any(|r| {
                    r.id == rr.repo.id
                        && r.indexed
                        && (rr.only_default_branch()
                            || rr
                                .revs
                                .iter()
                                .all(|rev| !is_rev_glob(rev) && r.branches.contains(rev)))
                })
            })
            .map(|rr| rr.repo.id)
            .collect())
    }
}

fn indexed_file(
    repo: &MemoryRepo,
    path: &str,
    line_matches: Vec<IndexedLineMatch>,
    symbols: Vec<IndexedSymbol>,
) -> IndexedFileMatch {
    IndexedFileMatch {
        repo: repo.repo_ref(),
        branches: vec!["HEAD".to_string()],
        commit: repo.head(),
        file_name: path.to_string(),
        language: language_of(path).to_string(),
        line_matches,
        symbols,
    }
}

#[async_trait]
impl UnindexedSearcher for MemoryBackend {
    async fn search(
        &self,
        request: &SearcherRequest,
        on_matches: &(dyn Fn(Vec<FileMatch>) + Send + Sync),
    ) -> BackendResult<bool> {
        self.record(format!("searcher:{}@{}", request.repo, request.commit));
        if request.repo.is_empty() || request.commit.is_empty() {
            return Err(BackendError::BadRequest(
                "repo and commit are required".to_string(),
            ));
        }
        let repo = self.find(&request.repo)?;
        if !is_rev_glob(&request.commit) && !repo.has_rev(&request.commit) {
            return Err(BackendError::RevisionNotFound {
                repo: repo.name.clone(),
                rev: request.commit.clone(),
            });
        }
        let outcome = Matcher::compile(&request.pattern_info)?.search(&repo.archive());
        if !outcome.matches.is_empty() {
            on_matches(outcome.matches);
        }
        Ok(outcome.limit_hit)
    }
}

#[async_trait]
impl SymbolSearcher for MemoryBackend {
    async fn search(&self, request: &SymbolRequest) -> BackendResult<Vec<SymbolRecord>> {
        self.record(format!("symbols:{}", request.repo.name));
        let repo = self.find(&request.repo.name)?;
        let name_re = if request.is_regexp {
            Some(build_regex(&request.pattern, !request.is_case_sensitive)?)
        } else {
            None
        };
        let include = request
            .include_patterns
            .iter()
            .map(|p| build_regex(p, true))
            .collect::<BackendResult<Vec<_>>>()?;
        let exclude = if request.exclude_pattern.is_empty() {
            None
        } else {
            Some(build_regex(&request.exclude_pattern, true)?)
        };

        let mut out: Vec<SymbolRecord> = repo
            .symbols
            .iter()
            .filter(|s| match &name_re {
                Some(re) => re.is_match(&s.name),
                None => contains(&s.name, &request.pattern, request.is_case_sensitive),
            })
            .filter(|s| include.iter().all(|re| re.is_match(&s.path)))
            .filter(|s| !exclude.as_ref().is_some_and(|re| re.is_match(&s.path)))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        if request.first > 0 {
            out.truncate(request.first);
        }
        Ok(out)
    }
}

fn diff_hunks(diff: &str) -> impl Iterator<Item = &str> {
    diff.lines().filter(|l| {
        (l.starts_with('+') || l.starts_with('-')) && !l.starts_with("+++") && !l.starts_with("---")
    })
}

fn commit_matches(q: &CommitQuery, commit: &RawCommit) -> BackendResult<bool> {
    Ok(match q {
        CommitQuery::And { children } => {
            for c in children {
                if !commit_matches(c, commit)? {
                    return Ok(false);
                }
            }
            true
        }
        CommitQuery::Or { children } => {
            for c in children {
                if commit_matches(c, commit)? {
                    return Ok(true);
                }
            }
            false
        }
        CommitQuery::Not { child } => !commit_matches(child, commit)?,
        CommitQuery::AuthorMatches { expr, ignore_case } => {
            let re = build_regex(expr, *ignore_case)?;
            re.is_match(&commit.author.name) || re.is_match(&commit.author.email)
        }
        CommitQuery::CommitterMatches { expr, ignore_case } => {
            let re = build_regex(expr, *ignore_case)?;
            re.is_match(&commit.committer.name) || re.is_match(&commit.committer.email)
        }
        CommitQuery::MessageMatches { expr, ignore_case } => {
            build_regex(expr, *ignore_case)?.is_match(&commit.message)
        }
        CommitQuery::DiffMatches { expr, ignore_case } => {
            let re = build_regex(expr, *ignore_case)?;
            let diff = commit.diff.as_deref().unwrap_or("");
            diff_hunks(diff).any(|l| re.is_match(&l[1..]))
        }
        CommitQuery::DiffModifiesFile { expr, ignore_case } => {
            let re = build_regex(expr, *ignore_case)?;
            commit.modified_files.iter().any(|f| re.is_match(f))
        }
        CommitQuery::CommitBefore { time } => commit.committer.date < *time,
        CommitQuery::CommitAfter { time } => commit.committer.date > *time,
        CommitQuery::Boolean { value } => *value,
    })
}

#[async_trait]
impl CommitSearcher for MemoryBackend {
    async fn search(
        &self,
        request: &CommitSearchRequest,
        on_matches: &(dyn Fn(Vec<RawCommit>) + Send + Sync),
    ) -> BackendResult<bool> {
        self.record(format!("commits:{}", request.repo.repo.name));
        let repo = self.find(&request.repo.repo.name)?;
        let mut out = Vec::new();
        let mut limit_hit = false;
        for commit in &repo.commits {
            if !commit_matches(&request.query, commit)? {
                continue;
            }
            if request.limit > 0 && out.len() == request.limit {
                limit_hit = true;
                break;
            }
            let mut c = commit.clone();
            if !request.include_diff {
                c.diff = None;
            }
            if !request.include_modified_files && !request.include_diff {
                c.modified_files.clear();
            }
            out.push(c);
        }
        if !out.is_empty() {
            on_matches(out);
        }
        Ok(limit_hit)
    }
}

/// Sub-repository permissions from a static deny list.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    denied: Vec<(String, String)>,
    failing: Vec<String>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny paths starting with `prefix` in `repo`.
    pub fn deny(mut self, repo: &str, prefix: &str) -> Self {
        self.denied.push((repo.to_string(), prefix.to_string()));
        self
    }

    /// Make checks on `path` fail with an error.
    pub fn fail_on(mut self, path: &str) -> Self {
        self.failing.push(path.to_string());
        self
    }
}

impl SubRepoPermissionChecker for StaticPermissions {
    fn enabled(&self) -> bool {
        !self.denied.is_empty() || !self.failing.is_empty()
    }

    fn can_read(&self, actor: &Actor, repo: &RepoRef, path: &str) -> BackendResult<bool> {
        if actor.internal {
            return Ok(true);
        }
        if self.failing.iter().any(|p| p == path) {
            return Err(BackendError::Unavailable(format!(
                "permission check failed for {path}"
            )));
        }
        Ok(!self
            .denied
            .iter()
            .any(|(r, prefix)| *r == repo.name && path.starts_with(prefix.as_str())))
    }
}

/// A backend whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    name: String,
}

impl FailingBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn fail<T>(&self) -> BackendResult<T> {
        Err(BackendError::Unavailable(self.name.clone()))
    }
}

#[async_trait]
impl IndexedSearcher for FailingBackend {
    async fn search(
        &self,
        _query: &IndexedQuery,
        _opts: &IndexedSearchOptions,
        _on_batch: &(dyn Fn(IndexedSearchBatch) + Send + Sync),
    ) -> BackendResult<()> {
        self.fail()
    }

    async fn indexed_repos(&self, _repos: &[RepoRevs]) -> BackendResult<BTreeSet<u32>> {
        self.fail()
    }
}

#[async_trait]
impl UnindexedSearcher for FailingBackend {
    async fn search(
        &self,
        _request: &SearcherRequest,
        _on_matches: &(dyn Fn(Vec<FileMatch>) + Send + Sync),
    ) -> BackendResult<bool> {
        self.fail()
    }
}

#[async_trait]
impl SymbolSearcher for FailingBackend {
    async fn search(&self, _request: &SymbolRequest) -> BackendResult<Vec<SymbolRecord>> {
        self.fail()
    }
}

#[async_trait]
impl CommitSearcher for FailingBackend {
    async fn search(
        &self,
        _request: &CommitSearchRequest,
        _on_matches: &(dyn Fn(Vec<RawCommit>) + Send + Sync),
    ) -> BackendResult<bool> {
        self.fail()
    }
}

#[async_trait]
impl RepoResolver for FailingBackend {
    async fn resolve_page(
        &self,
        _opts: &RepoOptions,
        _cursor: Option<u32>,
        _limit: usize,
    ) -> BackendResult<RepoPage> {
        self.fail()
    }

    async fn excluded(&self, _opts: &RepoOptions) -> BackendResult<ExcludedRepos> {
        self.fail()
    }

    async fn private_repos(&self, _opts: &RepoOptions) -> BackendResult<Vec<RepoRef>> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_of() {
        assert_eq!(language_of("src/main.go"), "Go");
        assert_eq!(language_of("README.MD"), "Markdown");
        assert_eq!(language_of("Makefile"), "");
    }

    #[test]
    fn test_parse_date_forms() {
        assert!(parse_date("2024-01-31").is_ok());
        assert!(parse_date("2024-01-31T10:00:00Z").is_ok());
        assert!(parse_date("last tuesday").is_err());
    }

    #[test]
    fn test_has_rev() {
        let repo = MemoryRepo::new(1, "a").with_branch("dev");
        assert!(repo.has_rev("HEAD"));
        assert!(repo.has_rev("main"));
        assert!(repo.has_rev("dev"));
        assert!(!repo.has_rev("v9"));
    }

    #[test]
    fn test_static_permissions() {
        let perms = StaticPermissions::new().deny("a", "secret/");
        let repo = RepoRef::new(1, "a");
        assert!(perms.enabled());
        assert!(!perms.can_read(&Actor::user(1), &repo, "secret/key").unwrap());
        assert!(perms.can_read(&Actor::user(1), &repo, "public/key").unwrap());
        assert!(perms.can_read(&Actor::internal(), &repo, "secret/key").unwrap());
    }
}
