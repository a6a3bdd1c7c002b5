//! Native types of the indexed search engine
//!
//! The engine consumes an `IndexedQuery` tree and streams back
//! `IndexedFileMatch` batches, one per repository.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::repos::RepoRef;

/// Repository-level restrictions understood natively by the indexed engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    pub only_public: bool,
    pub only_private: bool,
    pub only_forks: bool,
    pub no_forks: bool,
    pub only_archived: bool,
    pub no_archived: bool,
}

impl RawConfig {
    pub fn is_empty(&self) -> bool {
        *self == RawConfig::default()
    }

    fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.only_public {
            out.push("onlyPublic");
        }
        if self.only_private {
            out.push("onlyPrivate");
        }
        if self.only_forks {
            out.push("onlyForks");
        }
        if self.no_forks {
            out.push("noForks");
        }
        if self.only_archived {
            out.push("onlyArchived");
        }
        if self.no_archived {
            out.push("noArchived");
        }
        out
    }
}

/// Query tree of the indexed engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexedQuery {
    Const(bool),
    Substring {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    Regexp {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    /// Atoms under a symbol wrapper match symbol names instead of lines
    Symbol(Box<IndexedQuery>),
    Language(String),
    Branch(String),
    RepoRegexp(String),
    RepoSet(BTreeSet<String>),
    RawConfig(RawConfig),
    And(Vec<IndexedQuery>),
    Or(Vec<IndexedQuery>),
    Not(Box<IndexedQuery>),
}

impl IndexedQuery {
    /// Conjunction with constant folding and flattening.
    pub fn and(children: Vec<IndexedQuery>) -> IndexedQuery {
        let mut out = Vec::new();
        for child in children {
            match child {
                IndexedQuery::Const(true) => {}
                IndexedQuery::Const(false) => return IndexedQuery::Const(false),
                IndexedQuery::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => IndexedQuery::Const(true),
            1 => out.remove(0),
            _ => IndexedQuery::And(out),
        }
    }

    /// Disjunction with constant folding and flattening.
    pub fn or(children: Vec<IndexedQuery>) -> IndexedQuery {
        let mut out = Vec::new();
        for child in children {
            match child {
                IndexedQuery::Const(false) => {}
                IndexedQuery::Const(true) => return IndexedQuery::Const(true),
                IndexedQuery::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => IndexedQuery::Const(false),
            1 => out.remove(0),
            _ => IndexedQuery::Or(out),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: IndexedQuery) -> IndexedQuery {
        match child {
            IndexedQuery::Const(v) => IndexedQuery::Const(!v),
            IndexedQuery::Not(inner) => *inner,
            other => IndexedQuery::Not(Box::new(other)),
        }
    }
}

fn flags(case_sensitive: bool, file_name: bool, content: bool) -> String {
    let mut s = String::new();
    if case_sensitive {
        s.push_str("case_");
    }
    match (file_name, content) {
        (true, false) => s.push_str("file_"),
        (false, true) => s.push_str("content_"),
        _ => {}
    }
    s
}

impl fmt::Display for IndexedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexedQuery::Const(v) => write!(f, "{v}"),
            IndexedQuery::Substring {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => write!(
                f,
                "{}substr:{:?}",
                flags(*case_sensitive, *file_name, *content),
                pattern
            ),
            IndexedQuery::Regexp {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => write!(
                f,
                "{}regex:{:?}",
                flags(*case_sensitive, *file_name, *content),
                pattern
            ),
            IndexedQuery::Symbol(inner) => write!(f, "sym:{inner}"),
            IndexedQuery::Language(l) => write!(f, "lang:{l}"),
            IndexedQuery::Branch(b) => write!(f, "branch={b:?}"),
            IndexedQuery::RepoRegexp(r) => write!(f, "reporegex:{r:?}"),
            IndexedQuery::RepoSet(set) => write!(f, "(reposet {})", set.len()),
            IndexedQuery::RawConfig(c) => write!(f, "rawConfig:{}", c.labels().join("|")),
            IndexedQuery::And(children) => {
                f.write_str("(and")?;
                for c in children {
                    write!(f, " {c}")?;
                }
                f.write_str(")")
            }
            IndexedQuery::Or(children) => {
                f.write_str("(or")?;
                for c in children {
                    write!(f, " {c}")?;
                }
                f.write_str(")")
            }
            IndexedQuery::Not(inner) => write!(f, "(not {inner})"),
        }
    }
}

/// What the indexed engine should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedKind {
    #[default]
    Text,
    Symbol,
}

/// Per-request options of the indexed engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedSearchOptions {
    pub kind: IndexedKind,
    /// Maximum number of file matches to return over the whole request
    pub file_match_limit: usize,
    /// Optional `select:` projection, passed through for engine-side pruning
    pub select: Option<String>,
}

/// A line hit inside an indexed file match. `line_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedLineMatch {
    pub line_number: u32,
    pub line: String,
    /// `(offset, length)` pairs in bytes within `line`
    pub fragments: Vec<(u32, u32)>,
}

/// A symbol hit inside an indexed file match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSymbol {
    pub name: String,
    pub kind: String,
    pub line_number: u32,
}

/// One matching file from the indexed engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFileMatch {
    pub repo: RepoRef,
    pub branches: Vec<String>,
    pub commit: String,
    pub file_name: String,
    pub language: String,
    pub line_matches: Vec<IndexedLineMatch>,
    pub symbols: Vec<IndexedSymbol>,
}

/// A streamed batch from the indexed engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedSearchBatch {
    pub files: Vec<IndexedFileMatch>,
    pub limit_hit: bool,
}
