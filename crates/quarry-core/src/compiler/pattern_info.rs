//! Result types, text pattern info and indexed query translation

use quarry_backend::{IndexedKind, IndexedQuery, PatternInfo, RawConfig, RepoOptions, Visibility};

use crate::error::CompileError;
use crate::query::{field, Basic, SearchType};
use crate::result::{ResultTypes, SelectPath};

/// Result types requested by `type:` values. Without any, a non-empty
/// structural pattern asks for structural matches only and everything else
/// for file, path and repository matches.
pub fn compute_result_types(
    types: &[String],
    pattern: &str,
    search_type: SearchType,
) -> Result<ResultTypes, CompileError> {
    if types.is_empty() {
        return Ok(if search_type == SearchType::Structural && !pattern.is_empty() {
            ResultTypes::STRUCTURAL
        } else {
            ResultTypes::FILE | ResultTypes::PATH | ResultTypes::REPO
        });
    }
    types.iter().try_fold(ResultTypes::NONE, |acc, t| {
        ResultTypes::parse(t)
            .map(|parsed| acc | parsed)
            .ok_or_else(|| CompileError::InvalidValue {
                field: field::TYPE.to_string(),
                value: t.clone(),
            })
    })
}

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("go", r"\.go$"),
    ("rust", r"\.rs$"),
    ("python", r"\.py$"),
    ("typescript", r"\.(ts|tsx)$"),
    ("javascript", r"\.(js|jsx|mjs|cjs)$"),
    ("java", r"\.java$"),
    ("c", r"\.(c|h)$"),
    ("markdown", r"\.(md|markdown)$"),
    ("json", r"\.json$"),
    ("yaml", r"\.(yaml|yml)$"),
    ("text", r"\.txt$"),
];

/// Path regex selecting files of a language, by extension.
pub fn lang_include_pattern(lang: &str) -> Result<&'static str, CompileError> {
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(lang))
        .map(|(_, pattern)| *pattern)
        .ok_or_else(|| CompileError::InvalidValue {
            field: field::LANG.to_string(),
            value: lang.to_string(),
        })
}

fn check_path_pattern(pattern: &str) -> Result<(), CompileError> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| CompileError::InvalidPathPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Pattern info shared by every text, symbol and structural leaf of a
/// basic query.
///
/// Structural interpretation takes precedence over regexp interpretation,
/// so a structural pattern is never validated as a regex.
pub fn to_text_pattern_info(
    basic: &Basic,
    result_types: ResultTypes,
    search_type: SearchType,
    file_match_limit: usize,
) -> Result<PatternInfo, CompileError> {
    let pattern = basic.pattern_string();
    let is_structural = search_type == SearchType::Structural;
    let is_regexp = search_type == SearchType::Regex && !is_structural;
    if is_regexp && !pattern.is_empty() {
        regex::Regex::new(&pattern).map_err(|e| CompileError::InvalidRegexp {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }

    let (files, minus_files) = basic.string_values(field::FILE);
    for p in files.iter().chain(&minus_files) {
        check_path_pattern(p)?;
    }
    let (languages, _) = basic.string_values(field::LANG);
    let mut include_patterns = files;
    for lang in &languages {
        include_patterns.push(lang_include_pattern(lang)?.to_string());
    }

    let select = match basic.string_value(field::SELECT) {
        Some(v) => SelectPath::parse(v)?.to_string(),
        None => String::new(),
    };

    Ok(PatternInfo {
        pattern,
        is_negated: basic.is_pattern_negated(),
        is_regexp,
        is_structural_pat: is_structural,
        is_word_match: false,
        is_case_sensitive: basic.is_case_sensitive(),
        include_patterns,
        exclude_pattern: minus_files.join("|"),
        path_patterns_are_regexps: true,
        path_patterns_are_case_sensitive: basic.is_case_sensitive(),
        pattern_matches_content: result_types.has(ResultTypes::FILE),
        pattern_matches_path: result_types.has(ResultTypes::PATH),
        limit: file_match_limit,
        languages,
        select,
    })
}

/// Translate pattern info into an indexed-engine query.
///
/// With content-based language detection, `lang:` becomes language atoms
/// instead of extension restrictions on file names.
pub fn to_indexed_query(
    info: &PatternInfo,
    kind: IndexedKind,
    content_based_lang: bool,
) -> Result<IndexedQuery, CompileError> {
    let atom = if info.pattern.is_empty() || info.is_structural_pat {
        IndexedQuery::Const(true)
    } else {
        let file_name = info.pattern_matches_path;
        let content = info.matches_content();
        if info.is_regexp {
            IndexedQuery::Regexp {
                pattern: info.pattern.clone(),
                case_sensitive: info.is_case_sensitive,
                file_name,
                content,
            }
        } else {
            IndexedQuery::Substring {
                pattern: info.pattern.clone(),
                case_sensitive: info.is_case_sensitive,
                file_name,
                content,
            }
        }
    };
    let atom = if info.is_negated {
        IndexedQuery::not(atom)
    } else {
        atom
    };
    let atom = match kind {
        IndexedKind::Symbol => IndexedQuery::Symbol(Box::new(atom)),
        IndexedKind::Text => atom,
    };

    let lang_patterns = info
        .languages
        .iter()
        .map(|l| lang_include_pattern(l))
        .collect::<Result<Vec<_>, _>>()?;
    let file_atom = |pattern: &str| IndexedQuery::Regexp {
        pattern: pattern.to_string(),
        case_sensitive: info.path_patterns_are_case_sensitive,
        file_name: true,
        content: false,
    };

    let mut parts = vec![atom];
    for include in &info.include_patterns {
        if content_based_lang && lang_patterns.contains(&include.as_str()) {
            continue;
        }
        parts.push(file_atom(include));
    }
    if content_based_lang {
        parts.extend(info.languages.iter().cloned().map(IndexedQuery::Language));
    }
    if !info.exclude_pattern.is_empty() {
        parts.push(IndexedQuery::not(file_atom(&info.exclude_pattern)));
    }
    Ok(IndexedQuery::and(parts))
}

/// Scope of a universe search: default branches of repositories passing the
/// fork, archived and visibility flags, minus `-repo:` filters.
pub fn default_global_scope(opts: &RepoOptions) -> IndexedQuery {
    let config = RawConfig {
        only_public: opts.visibility == Visibility::Public,
        only_private: opts.visibility == Visibility::Private,
        only_forks: opts.only_forks,
        no_forks: opts.no_forks,
        only_archived: opts.only_archived,
        no_archived: opts.no_archived,
    };
    let mut parts = vec![IndexedQuery::Branch("HEAD".to_string())];
    if !config.is_empty() {
        parts.push(IndexedQuery::RawConfig(config));
    }
    for minus in &opts.minus_repo_filters {
        parts.push(IndexedQuery::not(IndexedQuery::RepoRegexp(minus.clone())));
    }
    IndexedQuery::and(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{to_basic_query, Node};

    fn basic(nodes: Vec<Node>) -> Basic {
        to_basic_query(&nodes).unwrap()
    }

    fn types(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compute_result_types() {
        let default = compute_result_types(&[], "foo", SearchType::Literal).unwrap();
        assert_eq!(default, ResultTypes::FILE | ResultTypes::PATH | ResultTypes::REPO);

        let structural = compute_result_types(&[], "foo(:[x])", SearchType::Structural).unwrap();
        assert_eq!(structural, ResultTypes::STRUCTURAL);

        let empty_structural = compute_result_types(&[], "", SearchType::Structural).unwrap();
        assert_eq!(empty_structural, default);

        let explicit =
            compute_result_types(&types(&["symbol", "commit"]), "x", SearchType::Literal).unwrap();
        assert_eq!(explicit, ResultTypes::SYMBOL | ResultTypes::COMMIT);

        assert!(compute_result_types(&types(&["blob"]), "x", SearchType::Literal).is_err());
    }

    #[test]
    fn test_pattern_info_fields() {
        let b = basic(vec![
            Node::parameter("file", r"\.go$"),
            Node::negated_parameter("file", "_test"),
            Node::negated_parameter("file", "vendor/"),
            Node::parameter("lang", "go"),
            Node::parameter("case", "yes"),
            Node::parameter("select", "file"),
            Node::pattern("fmt.Println"),
        ]);
        let info = to_text_pattern_info(&b, ResultTypes::FILE, SearchType::Regex, 30).unwrap();
        assert_eq!(info.pattern, "fmt.Println");
        assert!(info.is_regexp);
        assert!(info.is_case_sensitive);
        assert_eq!(info.include_patterns, vec![r"\.go$", r"\.go$"]);
        assert_eq!(info.exclude_pattern, "_test|vendor/");
        assert!(info.pattern_matches_content);
        assert!(!info.pattern_matches_path);
        assert_eq!(info.limit, 30);
        assert_eq!(info.languages, vec!["go"]);
        assert_eq!(info.select, "file");
    }

    #[test]
    fn test_pattern_info_errors() {
        let bad_regex = basic(vec![Node::pattern("foo(")]);
        assert!(matches!(
            to_text_pattern_info(&bad_regex, ResultTypes::FILE, SearchType::Regex, 30),
            Err(CompileError::InvalidRegexp { .. })
        ));
        // structural wins over regexp
        assert!(to_text_pattern_info(&bad_regex, ResultTypes::FILE, SearchType::Structural, 30)
            .unwrap()
            .is_structural_pat);
        // literal patterns are not regexes
        assert!(to_text_pattern_info(&bad_regex, ResultTypes::FILE, SearchType::Literal, 30).is_ok());

        let bad_path = basic(vec![Node::parameter("file", "[a-"), Node::pattern("x")]);
        assert!(matches!(
            to_text_pattern_info(&bad_path, ResultTypes::FILE, SearchType::Literal, 30),
            Err(CompileError::InvalidPathPattern { .. })
        ));

        let bad_lang = basic(vec![Node::parameter("lang", "klingon"), Node::pattern("x")]);
        assert!(to_text_pattern_info(&bad_lang, ResultTypes::FILE, SearchType::Literal, 30).is_err());

        let bad_select = basic(vec![Node::parameter("select", "symbol.nope"), Node::pattern("x")]);
        assert!(matches!(
            to_text_pattern_info(&bad_select, ResultTypes::FILE, SearchType::Literal, 30),
            Err(CompileError::InvalidSelect(_))
        ));
    }

    #[test]
    fn test_indexed_query_translation() {
        let b = basic(vec![
            Node::parameter("lang", "go"),
            Node::negated_parameter("file", "vendor/"),
            Node::pattern("main"),
        ]);
        let info = to_text_pattern_info(
            &b,
            ResultTypes::FILE | ResultTypes::PATH,
            SearchType::Literal,
            30,
        )
        .unwrap();

        let q = to_indexed_query(&info, IndexedKind::Text, false).unwrap();
        assert_eq!(
            q.to_string(),
            r#"(and substr:"main" file_regex:"\\.go$" (not file_regex:"vendor/"))"#
        );

        let q = to_indexed_query(&info, IndexedKind::Symbol, true).unwrap();
        assert_eq!(
            q.to_string(),
            r#"(and sym:substr:"main" lang:go (not file_regex:"vendor/"))"#
        );
    }

    #[test]
    fn test_default_global_scope() {
        let opts = RepoOptions {
            no_forks: true,
            no_archived: true,
            minus_repo_filters: vec!["old".into()],
            ..Default::default()
        };
        assert_eq!(
            default_global_scope(&opts).to_string(),
            r#"(and branch="HEAD" rawConfig:noForks|noArchived (not reporegex:"old"))"#
        );
    }
}
