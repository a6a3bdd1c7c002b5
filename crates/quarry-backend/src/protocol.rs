//! Wire types of the unindexed matcher service and the symbol backend
//!
//! A search request is POSTed as JSON; the response body is an event stream
//! of `matches` frames carrying `Vec<FileMatch>` and a terminal `done` frame
//! carrying `EventDone`. See `searcher_client::stream` for the framing.

use serde::{Deserialize, Serialize};

use crate::repos::RepoRef;

/// How to match a pattern against file contents and paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternInfo {
    pub pattern: String,
    pub is_negated: bool,
    pub is_regexp: bool,
    pub is_structural_pat: bool,
    pub is_word_match: bool,
    pub is_case_sensitive: bool,
    /// Every include pattern must match the path
    pub include_patterns: Vec<String>,
    /// A path matching this pattern is skipped; empty means none
    pub exclude_pattern: String,
    pub path_patterns_are_regexps: bool,
    pub path_patterns_are_case_sensitive: bool,
    pub pattern_matches_content: bool,
    pub pattern_matches_path: bool,
    /// Maximum number of file matches; 0 means unlimited
    pub limit: usize,
    pub languages: Vec<String>,
    pub select: String,
}

impl PatternInfo {
    /// True when neither content nor path matching was requested explicitly,
    /// in which case content matching applies.
    pub fn matches_content(&self) -> bool {
        self.pattern_matches_content || !self.pattern_matches_path
    }
}

/// Request body for the unindexed matcher service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearcherRequest {
    pub repo: String,
    pub repo_id: u32,
    /// Resolved commit or revision to search
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub fetch_timeout_ms: u64,
    pub pattern_info: PatternInfo,
    /// Whether the repository is also served by the indexed engine
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub indexer_endpoints: Vec<String>,
}

/// A matching line. `line_number` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    pub preview: String,
    pub line_number: u32,
    /// `[offset, length]` pairs within `preview`
    pub offset_and_lengths: Vec<[u32; 2]>,
}

/// A matching file. Path-only matches have no line matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub path: String,
    #[serde(default)]
    pub line_matches: Vec<LineMatch>,
    #[serde(default)]
    pub match_count: usize,
    #[serde(default)]
    pub limit_hit: bool,
}

/// Terminal frame of the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDone {
    #[serde(default)]
    pub limit_hit: bool,
    #[serde(default)]
    pub error: String,
}

/// Request to the symbol backend for one repository revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRequest {
    pub repo: RepoRef,
    pub commit: String,
    pub pattern: String,
    pub is_regexp: bool,
    pub is_case_sensitive: bool,
    pub include_patterns: Vec<String>,
    pub exclude_pattern: String,
    /// Maximum number of symbols to return
    pub first: usize,
}

/// A symbol definition. `line` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub parent: String,
}
