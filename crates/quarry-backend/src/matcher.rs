//! Local reference matcher over an in-memory archive
//!
//! Implements the unindexed matcher semantics without a network hop:
//! - content matching with literal, regexp, word and structural patterns
//! - include/exclude path filters as globs or regexps
//! - path matching, negation and per-request file limits
//!
//! Output is sorted by path with line matches sorted by line number.

use std::collections::BTreeMap;

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};

use crate::error::{BackendError, BackendResult};
use crate::protocol::{FileMatch, LineMatch, PatternInfo};
use crate::structural::structural_to_regex;

/// A file in an archive. Symlinks are stored with their target as content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl ArchiveFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Files containing a NUL byte in their first 8 KiB are binary.
    pub fn is_binary(&self) -> bool {
        self.content.iter().take(8 * 1024).any(|b| *b == 0)
    }
}

/// The file tree of one repository revision.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    files: Vec<ArchiveFile>,
}

impl Archive {
    pub fn new(mut files: Vec<ArchiveFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        Self { files }
    }

    pub fn files(&self) -> &[ArchiveFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<P: Into<String>, C: Into<Vec<u8>>> FromIterator<(P, C)> for Archive {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Archive::new(
            iter.into_iter()
                .map(|(p, c)| ArchiveFile::new(p, c))
                .collect(),
        )
    }
}

/// Result of searching one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matches: Vec<FileMatch>,
    pub limit_hit: bool,
}

enum PathPattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl PathPattern {
    fn compile(pattern: &str, info: &PatternInfo) -> BackendResult<Self> {
        if info.path_patterns_are_regexps {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(!info.path_patterns_are_case_sensitive)
                .build()?;
            Ok(PathPattern::Regex(re))
        } else {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(!info.path_patterns_are_case_sensitive)
                .literal_separator(false)
                .build()?;
            Ok(PathPattern::Glob(glob.compile_matcher()))
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            PathPattern::Glob(g) => g.is_match(path),
            PathPattern::Regex(r) => r.is_match(path),
        }
    }
}

/// Compiled form of a `PatternInfo`.
pub struct Matcher {
    content: Option<Regex>,
    include: Vec<PathPattern>,
    exclude: Option<PathPattern>,
    negated: bool,
    match_content: bool,
    match_path: bool,
    limit: usize,
}

impl Matcher {
    /// Validate and compile a pattern. Invalid patterns are request errors.
    pub fn compile(info: &PatternInfo) -> BackendResult<Self> {
        if info.is_structural_pat && info.is_negated {
            return Err(BackendError::BadRequest(
                "negated structural patterns are not supported".to_string(),
            ));
        }

        let content = if info.pattern.is_empty() {
            None
        } else {
            let mut expr = if info.is_structural_pat {
                structural_to_regex(&info.pattern)
            } else if info.is_regexp {
                info.pattern.clone()
            } else {
                regex::escape(&info.pattern)
            };
            if info.is_word_match {
                expr = format!(r"\b(?:{expr})\b");
            }
            Some(
                RegexBuilder::new(&expr)
                    .case_insensitive(!info.is_case_sensitive)
                    .multi_line(true)
                    .build()?,
            )
        };

        let include = info
            .include_patterns
            .iter()
            .map(|p| PathPattern::compile(p, info))
            .collect::<BackendResult<Vec<_>>>()?;
        let exclude = if info.exclude_pattern.is_empty() {
            None
        } else {
            Some(PathPattern::compile(&info.exclude_pattern, info)?)
        };

        Ok(Self {
            content,
            include,
            exclude,
            negated: info.is_negated,
            match_content: info.matches_content(),
            match_path: info.pattern_matches_path,
            limit: info.limit,
        })
    }

    fn path_allowed(&self, path: &str) -> bool {
        self.include.iter().all(|p| p.is_match(path))
            && !self.exclude.as_ref().is_some_and(|p| p.is_match(path))
    }

    /// Match one file, returning `None` when it does not qualify.
    pub fn match_file(&self, file: &ArchiveFile) -> Option<FileMatch> {
        if !self.path_allowed(&file.path) {
            return None;
        }

        let Some(re) = &self.content else {
            // An empty pattern selects every allowed path when matching paths.
            return (self.match_path || self.negated).then(|| path_only(&file.path));
        };

        let path_hit = self.match_path && re.is_match(&file.path);
        let lines = if self.match_content && !file.is_binary() {
            line_matches(&String::from_utf8_lossy(&file.content), re)
        } else {
            Vec::new()
        };

        if self.negated {
            return (!path_hit && lines.is_empty()).then(|| path_only(&file.path));
        }
        if !path_hit && lines.is_empty() {
            return None;
        }
        let match_count = lines
            .iter()
            .map(|l| l.offset_and_lengths.len().max(1))
            .sum();
        Some(FileMatch {
            path: file.path.clone(),
            line_matches: lines,
            match_count,
            limit_hit: false,
        })
    }

    /// Search every file of an archive in path order.
    pub fn search(&self, archive: &Archive) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        for file in archive.files() {
            if self.limit > 0 && outcome.matches.len() >= self.limit {
                outcome.limit_hit = true;
                break;
            }
            if let Some(m) = self.match_file(file) {
                outcome.matches.push(m);
            }
        }
        outcome
    }
}

/// Compile `info` and search `archive` with it.
pub fn search_archive(archive: &Archive, info: &PatternInfo) -> BackendResult<MatchOutcome> {
    Ok(Matcher::compile(info)?.search(archive))
}

fn path_only(path: &str) -> FileMatch {
    FileMatch {
        path: path.to_string(),
        line_matches: Vec::new(),
        match_count: 1,
        limit_hit: false,
    }
}

/// Map regex matches onto lines. A match spanning several lines reports each
/// line it touches; the newline terminating a line belongs to that line.
fn line_matches(content: &str, re: &Regex) -> Vec<LineMatch> {
    let starts: Vec<usize> = std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |pos: usize| starts.partition_point(|&s| s <= pos) - 1;
    let line_end = |line: usize| {
        starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(content.len())
    };

    let mut lines: BTreeMap<usize, Vec<[u32; 2]>> = BTreeMap::new();
    for m in re.find_iter(content) {
        if m.start() == m.end() {
            continue;
        }
        for line in line_of(m.start())..=line_of(m.end() - 1) {
            let (ls, le) = (starts[line], line_end(line));
            let fragments = lines.entry(line).or_default();
            let (s, e) = (m.start().max(ls), m.end().min(le));
            if e > s {
                fragments.push([(s - ls) as u32, (e - s) as u32]);
            }
        }
    }

    lines
        .into_iter()
        .map(|(line, offset_and_lengths)| LineMatch {
            preview: content[starts[line]..line_end(line)].to_string(),
            line_number: line as u32,
            offset_and_lengths,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_match_touches_each_line() {
        let re = Regex::new("a\nb").unwrap();
        let lines = line_matches("xa\nby\n", &re);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_number, 0);
        assert_eq!(lines[0].offset_and_lengths, vec![[1, 1]]);
        assert_eq!(lines[1].preview, "by");
        assert_eq!(lines[1].offset_and_lengths, vec![[0, 1]]);
    }

    #[test]
    fn test_repeated_hits_on_one_line_are_merged() {
        let re = Regex::new("o").unwrap();
        let lines = line_matches("foo", &re);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].offset_and_lengths, vec![[1, 1], [2, 1]]);
    }

    #[test]
    fn test_limit_marks_outcome() {
        let archive: Archive = vec![("a", "x"), ("b", "x"), ("c", "x")]
            .into_iter()
            .collect();
        let info = PatternInfo {
            pattern: "x".into(),
            limit: 2,
            ..Default::default()
        };
        let out = search_archive(&archive, &info).unwrap();
        assert_eq!(out.matches.len(), 2);
        assert!(out.limit_hit);
    }

    #[test]
    fn test_binary_is_detected() {
        assert!(ArchiveFile::new("x.png", vec![0u8, 1, 2]).is_binary());
        assert!(!ArchiveFile::new("x.txt", "text").is_binary());
    }
}
