use quarry_backend::{RepoFilter, RepoOptions, Visibility};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::query::{field, Basic, YesNoOnly};

/// Per-user search defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub include_forks: Option<bool>,
    #[serde(default)]
    pub include_archived: Option<bool>,
}

const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// True when the filters name exactly one repository: a single filter of
/// the form `^literal$`, where the literal may only escape dots.
pub fn exactly_one_repo(repo_filters: &[String]) -> bool {
    let [filter] = repo_filters else {
        return false;
    };
    let pattern = RepoFilter::parse(filter).pattern;
    let Some(inner) = pattern
        .strip_prefix('^')
        .and_then(|p| p.strip_suffix('$'))
    else {
        return false;
    };
    let literal = inner.replace("\\.", "");
    !literal.is_empty() && !literal.contains(REGEX_META)
}

fn tri_state(explicit: Option<YesNoOnly>, included_by_default: bool) -> YesNoOnly {
    explicit.unwrap_or(if included_by_default {
        YesNoOnly::Yes
    } else {
        YesNoOnly::No
    })
}

/// Repository filter criteria of a basic query.
///
/// Forks and archived repositories are excluded unless exactly one
/// repository is targeted or the user settings include them. An explicit
/// `fork:`/`archived:` value always wins.
pub fn to_repo_options(basic: &Basic, settings: &UserSettings) -> Result<RepoOptions, CompileError> {
    let (repo_filters, minus_repo_filters) = basic.repositories();
    let one_repo = exactly_one_repo(&repo_filters);

    let fork = tri_state(
        basic.fork()?,
        one_repo || settings.include_forks.unwrap_or(false),
    );
    let archived = tri_state(
        basic.archived()?,
        one_repo || settings.include_archived.unwrap_or(false),
    );
    let (has_file, minus_has_file) = basic.string_values(field::REPO_HAS_FILE);

    Ok(RepoOptions {
        repo_filters,
        minus_repo_filters,
        case_sensitive_repo_filters: false,
        search_context_spec: basic
            .string_value(field::CONTEXT)
            .unwrap_or_default()
            .to_string(),
        only_forks: fork == YesNoOnly::Only,
        no_forks: fork == YesNoOnly::No,
        only_archived: archived == YesNoOnly::Only,
        no_archived: archived == YesNoOnly::No,
        visibility: basic
            .string_value(field::VISIBILITY)
            .map(Visibility::parse)
            .unwrap_or_default(),
        commit_after: basic
            .string_value(field::REPO_HAS_COMMIT_AFTER)
            .map(str::to_string),
        has_file,
        minus_has_file,
    })
}

/// Extend `opts` with the search pattern as a repository name filter.
///
/// Returns `None` when the pattern cannot be used that way: a pattern
/// starting with `@`, or one whose part before `@` is not a valid regex.
/// Only the part before `@` is used, so it is never read as `repo@rev`.
pub fn add_pattern_as_repo_filter(
    pattern: &str,
    opts: &RepoOptions,
    case_sensitive: bool,
) -> Option<RepoOptions> {
    if pattern.is_empty() {
        return Some(opts.clone());
    }
    let mut opts = opts.clone();
    opts.case_sensitive_repo_filters = case_sensitive;
    match pattern.split_once('@') {
        None => opts.repo_filters.push(pattern.to_string()),
        Some(("", _)) => return None,
        Some((prefix, _)) => {
            regex::Regex::new(prefix).ok()?;
            opts.repo_filters.push(prefix.to_string());
        }
    }
    Some(opts)
}
