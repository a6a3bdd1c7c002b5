//! Query tree types consumed by the compiler
//!
//! - `node`: the parsed boolean expression tree
//! - `basic`: a query split into parameters and one pattern expression
//! - `plan`: a disjunction of basic queries

mod basic;
mod node;
mod plan;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;

pub use basic::{to_basic_query, Basic};
pub use node::{nodes_to_string, Node, OperatorKind, Parameter, Pattern};
pub use plan::{expand_plan, Plan};

/// Parameter field names.
pub mod field {
    pub const REPO: &str = "repo";
    pub const CONTEXT: &str = "context";
    pub const TYPE: &str = "type";
    pub const DEFAULT: &str = "default";
    pub const INDEX: &str = "index";
    pub const COUNT: &str = "count";
    pub const TIMEOUT: &str = "timeout";
    pub const FORK: &str = "fork";
    pub const ARCHIVED: &str = "archived";
    pub const VISIBILITY: &str = "visibility";
    pub const CASE: &str = "case";
    pub const REPO_HAS_FILE: &str = "repohasfile";
    pub const REPO_HAS_COMMIT_AFTER: &str = "repohascommitafter";
    pub const PATTERN_TYPE: &str = "patterntype";
    pub const SELECT: &str = "select";
    pub const FILE: &str = "file";
    pub const LANG: &str = "lang";
    pub const AUTHOR: &str = "author";
    pub const COMMITTER: &str = "committer";
    pub const MESSAGE: &str = "message";
    pub const BEFORE: &str = "before";
    pub const AFTER: &str = "after";
    pub const CONTENT: &str = "content";
}

/// How the pattern is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Literal,
    Regex,
    Structural,
}

impl SearchType {
    pub fn parse(value: &str) -> Option<SearchType> {
        match value.to_ascii_lowercase().as_str() {
            "literal" | "standard" => Some(SearchType::Literal),
            "regex" | "regexp" => Some(SearchType::Regex),
            "structural" => Some(SearchType::Structural),
            _ => None,
        }
    }
}

/// How results are delivered to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Batch,
    Streaming,
}

/// Tri-state value of `fork:`, `archived:` and `index:`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YesNoOnly {
    #[default]
    Yes,
    No,
    Only,
}

impl YesNoOnly {
    pub fn parse(field: &str, value: &str) -> Result<YesNoOnly, CompileError> {
        match value.to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Ok(YesNoOnly::Yes),
            "no" | "n" | "false" | "0" => Ok(YesNoOnly::No),
            "only" | "o" => Ok(YesNoOnly::Only),
            _ => Err(CompileError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            YesNoOnly::Yes => "yes",
            YesNoOnly::No => "no",
            YesNoOnly::Only => "only",
        }
    }
}

/// Parse a duration such as `30s`, `1m30s`, `1.5h` or `500ms`.
pub fn parse_duration(value: &str) -> Result<Duration, CompileError> {
    let invalid = || CompileError::InvalidDuration(value.to_string());
    let s = value.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += number * seconds_per_unit;
    }
    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}
