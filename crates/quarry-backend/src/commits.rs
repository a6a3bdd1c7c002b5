//! Native types of the commit and diff search backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repos::RepoRevs;

/// Query tree evaluated by the commit backend against each commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitQuery {
    And { children: Vec<CommitQuery> },
    Or { children: Vec<CommitQuery> },
    Not { child: Box<CommitQuery> },
    AuthorMatches { expr: String, ignore_case: bool },
    CommitterMatches { expr: String, ignore_case: bool },
    MessageMatches { expr: String, ignore_case: bool },
    DiffMatches { expr: String, ignore_case: bool },
    DiffModifiesFile { expr: String, ignore_case: bool },
    CommitBefore { time: DateTime<Utc> },
    CommitAfter { time: DateTime<Utc> },
    Boolean { value: bool },
}

impl CommitQuery {
    pub fn and(children: Vec<CommitQuery>) -> CommitQuery {
        let mut out: Vec<CommitQuery> = children
            .into_iter()
            .filter(|c| *c != CommitQuery::Boolean { value: true })
            .collect();
        match out.len() {
            0 => CommitQuery::Boolean { value: true },
            1 => out.remove(0),
            _ => CommitQuery::And { children: out },
        }
    }

    pub fn or(children: Vec<CommitQuery>) -> CommitQuery {
        let mut out: Vec<CommitQuery> = children
            .into_iter()
            .filter(|c| *c != CommitQuery::Boolean { value: false })
            .collect();
        match out.len() {
            0 => CommitQuery::Boolean { value: false },
            1 => out.remove(0),
            _ => CommitQuery::Or { children: out },
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: CommitQuery) -> CommitQuery {
        CommitQuery::Not {
            child: Box::new(child),
        }
    }

    /// S-expression rendering used when printing job trees.
    pub fn describe(&self) -> String {
        fn list(op: &str, children: &[CommitQuery]) -> String {
            let inner: Vec<String> = children.iter().map(CommitQuery::describe).collect();
            format!("({op} {})", inner.join(" "))
        }
        match self {
            CommitQuery::And { children } => list("and", children),
            CommitQuery::Or { children } => list("or", children),
            CommitQuery::Not { child } => format!("(not {})", child.describe()),
            CommitQuery::AuthorMatches { expr, .. } => format!("author:{expr:?}"),
            CommitQuery::CommitterMatches { expr, .. } => format!("committer:{expr:?}"),
            CommitQuery::MessageMatches { expr, .. } => format!("message:{expr:?}"),
            CommitQuery::DiffMatches { expr, .. } => format!("diff:{expr:?}"),
            CommitQuery::DiffModifiesFile { expr, .. } => format!("file:{expr:?}"),
            CommitQuery::CommitBefore { time } => format!("before:{}", time.to_rfc3339()),
            CommitQuery::CommitAfter { time } => format!("after:{}", time.to_rfc3339()),
            CommitQuery::Boolean { value } => value.to_string(),
        }
    }
}

/// Request to search the commits of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSearchRequest {
    pub repo: RepoRevs,
    pub query: CommitQuery,
    pub include_diff: bool,
    pub include_modified_files: bool,
    /// Maximum number of commits; 0 means unlimited
    pub limit: usize,
}

/// Author or committer of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// A commit as returned by the commit backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    pub oid: String,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    #[serde(default)]
    pub parents: Vec<String>,
    /// Unified diff text, present for diff searches
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_drops_true() {
        let q = CommitQuery::and(vec![
            CommitQuery::Boolean { value: true },
            CommitQuery::AuthorMatches {
                expr: "alice".into(),
                ignore_case: true,
            },
        ]);
        assert_eq!(q.describe(), "author:\"alice\"");
    }

    #[test]
    fn test_serde_tagged() {
        let q = CommitQuery::MessageMatches {
            expr: "fix".into(),
            ignore_case: false,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "message_matches");
    }
}
