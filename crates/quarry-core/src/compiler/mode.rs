use crate::error::CompileError;
use crate::query::{field, Basic, SearchType, YesNoOnly};
use crate::result::ResultTypes;

/// How a basic query is spread over the indexed and unindexed backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyFlags {
    /// Search every indexed repository in one indexed-engine query
    pub repo_universe_search: bool,
    /// Do not resolve repositories page by page at all
    pub skip_repo_subset_search: bool,
    /// Repository pages only go to the unindexed matcher; the universe
    /// search already covers indexed repositories
    pub only_run_searcher: bool,
}

/// No positive `repo:`, no `repohasfile:`, a global search context and a
/// non-structural pattern type.
fn is_global(basic: &Basic, search_type: SearchType) -> bool {
    if search_type == SearchType::Structural {
        return false;
    }
    basic.parameters.iter().all(|p| match p.field.as_str() {
        field::CONTEXT => p.value.is_empty() || p.value == "global",
        field::REPO => p.negated,
        field::REPO_HAS_FILE => false,
        _ => true,
    })
}

pub fn job_mode(
    basic: &Basic,
    result_types: ResultTypes,
    search_type: SearchType,
    hosted: bool,
) -> Result<StrategyFlags, CompileError> {
    let globally_searchable =
        result_types.has(ResultTypes::FILE | ResultTypes::PATH | ResultTypes::SYMBOL);
    let indexed = basic.index()? != YesNoOnly::No;
    let is_empty = basic.pattern_string().is_empty()
        && !basic.exists(field::FILE)
        && !basic.exists(field::LANG);

    let repo_universe_search =
        is_global(basic, search_type) && indexed && globally_searchable && !is_empty;
    Ok(StrategyFlags {
        repo_universe_search,
        skip_repo_subset_search: is_empty || (repo_universe_search && hosted),
        only_run_searcher: repo_universe_search && !hosted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{to_basic_query, Node};

    fn basic(nodes: Vec<Node>) -> Basic {
        to_basic_query(&nodes).unwrap()
    }

    const TEXT: ResultTypes = ResultTypes::FILE;

    #[test]
    fn test_global_pattern_is_universe_search() {
        let b = basic(vec![Node::pattern("foo")]);
        let flags = job_mode(&b, TEXT, SearchType::Literal, false).unwrap();
        assert_eq!(
            flags,
            StrategyFlags {
                repo_universe_search: true,
                skip_repo_subset_search: false,
                only_run_searcher: true,
            }
        );

        let hosted = job_mode(&b, TEXT, SearchType::Literal, true).unwrap();
        assert!(hosted.repo_universe_search);
        assert!(hosted.skip_repo_subset_search);
        assert!(!hosted.only_run_searcher);
    }

    #[test]
    fn test_repo_filter_disables_universe_search() {
        let b = basic(vec![Node::parameter("repo", "acme"), Node::pattern("foo")]);
        let flags = job_mode(&b, TEXT, SearchType::Literal, false).unwrap();
        assert_eq!(flags, StrategyFlags::default());

        let negated = basic(vec![
            Node::negated_parameter("repo", "acme"),
            Node::pattern("foo"),
        ]);
        assert!(
            job_mode(&negated, TEXT, SearchType::Literal, false)
                .unwrap()
                .repo_universe_search
        );
    }

    #[test]
    fn test_non_global_conditions() {
        let cases = vec![
            (vec![Node::parameter("context", "@alice"), Node::pattern("foo")], SearchType::Literal),
            (vec![Node::parameter("repohasfile", "go.mod"), Node::pattern("foo")], SearchType::Literal),
            (vec![Node::parameter("index", "no"), Node::pattern("foo")], SearchType::Literal),
            (vec![Node::pattern("foo")], SearchType::Structural),
        ];
        for (nodes, search_type) in cases {
            let b = basic(nodes);
            assert!(!job_mode(&b, TEXT, search_type, false).unwrap().repo_universe_search);
        }
    }

    #[test]
    fn test_empty_query_skips_subset_search() {
        let b = basic(vec![Node::parameter("type", "file")]);
        let flags = job_mode(&b, TEXT, SearchType::Literal, false).unwrap();
        assert!(!flags.repo_universe_search);
        assert!(flags.skip_repo_subset_search);

        let lang_only = basic(vec![Node::parameter("lang", "go")]);
        let flags = job_mode(&lang_only, TEXT, SearchType::Literal, false).unwrap();
        assert!(flags.repo_universe_search);
    }

    #[test]
    fn test_repo_only_types_are_not_universe() {
        let b = basic(vec![Node::pattern("foo")]);
        let flags = job_mode(&b, ResultTypes::COMMIT, SearchType::Literal, false).unwrap();
        assert!(!flags.repo_universe_search);
    }

    #[test]
    fn test_invalid_index_value() {
        let b = basic(vec![Node::parameter("index", "sometimes"), Node::pattern("foo")]);
        assert!(job_mode(&b, TEXT, SearchType::Literal, false).is_err());
    }
}
