//! Common result model
//!
//! Every leaf converts its backend's native matches into `Match` values.
//! A `MatchKey` identifies the thing a match points at, independent of
//! which backend found it, and drives AND/OR set semantics and dedupe.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;

use quarry_backend::{LineMatch, RepoRef, Signature};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Bit set of requested result types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultTypes(u8);

impl ResultTypes {
    pub const NONE: ResultTypes = ResultTypes(0);
    pub const FILE: ResultTypes = ResultTypes(1);
    pub const PATH: ResultTypes = ResultTypes(1 << 1);
    pub const SYMBOL: ResultTypes = ResultTypes(1 << 2);
    pub const COMMIT: ResultTypes = ResultTypes(1 << 3);
    pub const DIFF: ResultTypes = ResultTypes(1 << 4);
    pub const REPO: ResultTypes = ResultTypes(1 << 5);
    pub const STRUCTURAL: ResultTypes = ResultTypes(1 << 6);

    const NAMES: [(ResultTypes, &'static str); 7] = [
        (Self::FILE, "file"),
        (Self::PATH, "path"),
        (Self::SYMBOL, "symbol"),
        (Self::COMMIT, "commit"),
        (Self::DIFF, "diff"),
        (Self::REPO, "repo"),
        (Self::STRUCTURAL, "structural"),
    ];

    /// Parse a single `type:` value.
    pub fn parse(value: &str) -> Option<ResultTypes> {
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(value))
            .map(|(t, _)| *t)
    }

    /// True if any of the bits in `other` are set.
    pub fn has(self, other: ResultTypes) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: ResultTypes) -> ResultTypes {
        ResultTypes(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if exactly the bits of `other` are set.
    pub fn is_only(self, other: ResultTypes) -> bool {
        self == other
    }
}

impl BitOr for ResultTypes {
    type Output = ResultTypes;

    fn bitor(self, rhs: ResultTypes) -> ResultTypes {
        ResultTypes(self.0 | rhs.0)
    }
}

impl fmt::Display for ResultTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(t, _)| self.has(*t))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// Identity of a match for set operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub repo: RepoRef,
    /// `None` means the default branch
    pub rev: Option<String>,
    pub commit: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMatch {
    pub repo: RepoRef,
    #[serde(default)]
    pub rev: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: String,
    /// 0-based
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub repo: RepoRef,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub commit: String,
    pub path: String,
    /// Sorted by line number, 0-based
    #[serde(default)]
    pub line_matches: Vec<LineMatch>,
    #[serde(default)]
    pub symbols: Vec<SymbolMatch>,
    #[serde(default)]
    pub limit_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMatch {
    pub repo: RepoRef,
    pub oid: String,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Match {
    Repo(RepoMatch),
    File(FileMatch),
    Commit(CommitMatch),
}

impl Match {
    pub fn repo(&self) -> &RepoRef {
        match self {
            Match::Repo(m) => &m.repo,
            Match::File(m) => &m.repo,
            Match::Commit(m) => &m.repo,
        }
    }

    pub fn key(&self) -> MatchKey {
        match self {
            Match::Repo(m) => MatchKey {
                repo: m.repo.clone(),
                rev: m.rev.clone(),
                commit: None,
                path: None,
            },
            Match::File(m) => MatchKey {
                repo: m.repo.clone(),
                rev: m.rev.clone(),
                commit: None,
                path: Some(m.path.clone()),
            },
            Match::Commit(m) => MatchKey {
                repo: m.repo.clone(),
                rev: None,
                commit: Some(m.oid.clone()),
                path: None,
            },
        }
    }

    /// Number of results this match counts for against a limit.
    pub fn result_count(&self) -> usize {
        match self {
            Match::File(m) => (m.line_matches.len() + m.symbols.len()).max(1),
            _ => 1,
        }
    }

    /// Drop line and symbol matches beyond `n`. Returns the new count.
    pub fn truncate(&mut self, n: usize) -> usize {
        if let Match::File(m) = self {
            if m.line_matches.len() + m.symbols.len() > n {
                m.limit_hit = true;
                m.line_matches.truncate(n);
                let remaining = n - m.line_matches.len();
                m.symbols.truncate(remaining);
            }
        }
        self.result_count()
    }

    /// Fold a match with the same key into this one.
    pub fn merge(&mut self, other: Match) {
        if let (Match::File(a), Match::File(b)) = (self, other) {
            let mut lines: BTreeMap<u32, LineMatch> = a
                .line_matches
                .drain(..)
                .map(|l| (l.line_number, l))
                .collect();
            for line in b.line_matches {
                match lines.get_mut(&line.line_number) {
                    Some(existing) => {
                        for range in line.offset_and_lengths {
                            if !existing.offset_and_lengths.contains(&range) {
                                existing.offset_and_lengths.push(range);
                            }
                        }
                        existing.offset_and_lengths.sort_unstable();
                    }
                    None => {
                        lines.insert(line.line_number, line);
                    }
                }
            }
            a.line_matches = lines.into_values().collect();
            for sym in b.symbols {
                if !a.symbols.contains(&sym) {
                    a.symbols.push(sym);
                }
            }
            a.limit_hit |= b.limit_hit;
            if a.commit.is_empty() {
                a.commit = b.commit;
            }
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn at(repo: &RepoRef, rev: &Option<String>) -> String {
            match rev {
                Some(rev) => format!("{}@{rev}", repo.name),
                None => repo.name.clone(),
            }
        }
        match self {
            Match::Repo(m) => write!(f, "repo {}", at(&m.repo, &m.rev)),
            Match::File(m) => {
                let prefix = format!("{}:{}", at(&m.repo, &m.rev), m.path);
                if m.line_matches.is_empty() && m.symbols.is_empty() {
                    return write!(f, "{prefix}");
                }
                let mut first = true;
                for line in &m.line_matches {
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(f, "{prefix}:{}:{}", line.line_number + 1, line.preview)?;
                }
                for sym in &m.symbols {
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(f, "{prefix}:{}: {} ({})", sym.line + 1, sym.name, sym.kind)?;
                }
                Ok(())
            }
            Match::Commit(m) => {
                let short = m.oid.get(..7).unwrap_or(m.oid.as_str());
                let subject = m.message.lines().next().unwrap_or_default();
                write!(f, "{}@{short} {subject}", m.repo.name)
            }
        }
    }
}

/// Projection applied by the `select:` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectPath {
    Repo,
    File,
    FileDirectory,
    Content,
    Symbol(Option<String>),
    Commit,
}

const SYMBOL_KINDS: &[&str] = &[
    "file", "module", "namespace", "package", "class", "method", "property", "field",
    "constructor", "enum", "interface", "function", "variable", "constant", "string",
    "number", "boolean", "array", "object", "key", "null", "enum-member", "struct",
    "event", "operator", "type-parameter",
];

impl SelectPath {
    pub fn parse(value: &str) -> Result<SelectPath, CompileError> {
        let invalid = || CompileError::InvalidSelect(value.to_string());
        let mut parts = value.split('.');
        let head = parts.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<&str> = parts.collect();
        let select = match (head.as_str(), rest.as_slice()) {
            ("repo", []) => SelectPath::Repo,
            ("file", []) => SelectPath::File,
            ("file", ["directory"]) => SelectPath::FileDirectory,
            ("content", []) => SelectPath::Content,
            ("commit", []) => SelectPath::Commit,
            ("symbol", []) => SelectPath::Symbol(None),
            ("symbol", [kind]) => {
                let kind = kind.to_ascii_lowercase();
                if !SYMBOL_KINDS.contains(&kind.as_str()) {
                    return Err(invalid());
                }
                SelectPath::Symbol(Some(kind))
            }
            _ => return Err(invalid()),
        };
        Ok(select)
    }

    /// The root field, as passed on to backends.
    pub fn root(&self) -> &'static str {
        match self {
            SelectPath::Repo => "repo",
            SelectPath::File | SelectPath::FileDirectory => "file",
            SelectPath::Content => "content",
            SelectPath::Symbol(_) => "symbol",
            SelectPath::Commit => "commit",
        }
    }

    /// Projections that collapse many matches onto one key.
    pub fn dedupes(&self) -> bool {
        matches!(
            self,
            SelectPath::Repo | SelectPath::File | SelectPath::FileDirectory
        )
    }

    /// Map a match through the projection; `None` drops it.
    pub fn project(&self, m: Match) -> Option<Match> {
        match (self, m) {
            (SelectPath::Repo, m) => {
                let rev = match &m {
                    Match::Repo(r) => r.rev.clone(),
                    Match::File(f) => f.rev.clone(),
                    Match::Commit(_) => None,
                };
                Some(Match::Repo(RepoMatch {
                    repo: m.repo().clone(),
                    rev,
                }))
            }
            (SelectPath::File, Match::File(mut f)) => {
                f.line_matches.clear();
                f.symbols.clear();
                Some(Match::File(f))
            }
            (SelectPath::FileDirectory, Match::File(mut f)) => {
                f.line_matches.clear();
                f.symbols.clear();
                f.path = match f.path.rfind('/') {
                    Some(idx) => f.path[..=idx].to_string(),
                    None => "/".to_string(),
                };
                Some(Match::File(f))
            }
            (SelectPath::Content, Match::File(mut f)) => {
                if f.line_matches.is_empty() {
                    return None;
                }
                f.symbols.clear();
                Some(Match::File(f))
            }
            (SelectPath::Symbol(kind), Match::File(mut f)) => {
                f.line_matches.clear();
                if let Some(kind) = kind {
                    f.symbols.retain(|s| s.kind.eq_ignore_ascii_case(kind));
                }
                if f.symbols.is_empty() {
                    return None;
                }
                Some(Match::File(f))
            }
            (SelectPath::Commit, m @ Match::Commit(_)) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for SelectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectPath::FileDirectory => f.write_str("file.directory"),
            SelectPath::Symbol(Some(kind)) => write!(f, "symbol.{kind}"),
            other => f.write_str(other.root()),
        }
    }
}
