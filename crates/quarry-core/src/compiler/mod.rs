//! Query compiler
//!
//! Turns a parsed query tree into an executable job tree:
//!
//! ```text
//! Alert(Or(
//!     Timeout(Limit(Select?(                       one per basic query
//!         Filter?(Priority(Parallel(required), Parallel(optional)))
//!     ))),
//!     ...
//! ))
//! ```
//!
//! AND and OR pattern expressions compile operand by operand into `And` and
//! `Or` jobs. Compilation is pure: no backend is called, and compiling the
//! same query twice yields the same tree.

mod commit_query;
mod mode;
mod pattern_info;
mod repo_options;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use quarry_backend::{IndexedKind, IndexedSearchOptions, PatternInfo, RepoOptions, Visibility};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CompileError, SearchResult};
use crate::job::{
    AlertJob, And, CommitSearchJob, ComputeExcludedRepos, Filter, GlobalIndexedSearch, IndexedSubsetSearch,
    JobRef, Limit, Noop, Or, Parallel, Priority, RepoPager, RepoSearchJob, RepoSearchMode, Select,
    SearcherJob, StructuralSearchJob, SymbolSearcherJob, Timeout,
};
use crate::obs;
use crate::query::{
    expand_plan, field, nodes_to_string, to_basic_query, Basic, Node, OperatorKind, Plan,
    Protocol, SearchType,
};
use crate::result::{ResultTypes, SelectPath};

pub use commit_query::{parse_commit_date, to_commit_query};
pub use mode::{job_mode, StrategyFlags};
pub use pattern_info::{
    compute_result_types, default_global_scope, lang_include_pattern, to_indexed_query,
    to_text_pattern_info,
};
pub use repo_options::{add_pattern_as_repo_filter, exactly_one_repo, to_repo_options, UserSettings};

/// Feature flag: `lang:` uses content-based language detection in the
/// indexed engine instead of file extensions.
pub const CONTENT_BASED_LANG_FLAG: &str = "search-content-based-lang-detection";

/// Fields a repository search understands. A query with any other field
/// does not search repository names.
const REPO_SEARCH_FIELDS: &[&str] = &[
    field::REPO,
    field::CONTEXT,
    field::TYPE,
    field::DEFAULT,
    field::INDEX,
    field::COUNT,
    field::TIMEOUT,
    field::FORK,
    field::ARCHIVED,
    field::VISIBILITY,
    field::CASE,
    field::REPO_HAS_FILE,
    field::REPO_HAS_COMMIT_AFTER,
    field::PATTERN_TYPE,
    field::SELECT,
];

/// Everything about a search request besides the query tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchInputs {
    /// Original query text, used in alert messages
    pub query_string: String,
    pub pattern_type: SearchType,
    pub protocol: Protocol,
    pub features: BTreeMap<String, bool>,
    pub user_settings: UserSettings,
    /// Multi-tenant deployment where the unindexed long tail is not searched
    /// globally
    pub hosted: bool,
    /// Sub-repository permissions are enforced
    pub sub_repo_perms: bool,
}

impl SearchInputs {
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Result limit when the query has no `count:`.
    pub fn default_limit(&self, config: &EngineConfig) -> usize {
        match self.protocol {
            Protocol::Batch => config.batch_result_limit,
            Protocol::Streaming => config.streaming_result_limit,
        }
    }
}

/// Compiler arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub inputs: SearchInputs,
    pub config: EngineConfig,
}

impl Args {
    pub fn new(inputs: SearchInputs, config: EngineConfig) -> Self {
        Self { inputs, config }
    }
}

/// `timeout:` if given, else the maximum timeout when `count:` is given,
/// else the default timeout. Never above the maximum.
pub fn timeout_duration(basic: &Basic, config: &EngineConfig) -> Result<Duration, CompileError> {
    let timeout = match basic.timeout()? {
        Some(t) => t,
        None if basic.exists(field::COUNT) => config.max_timeout(),
        None => config.default_timeout(),
    };
    Ok(timeout.min(config.max_timeout()))
}

fn max_results(basic: &Basic, args: &Args) -> Result<usize, CompileError> {
    Ok(basic
        .count()?
        .unwrap_or_else(|| args.inputs.default_limit(&args.config)))
}

fn search_type_of(basic: &Basic, inputs: &SearchInputs) -> SearchType {
    basic
        .string_value(field::PATTERN_TYPE)
        .and_then(SearchType::parse)
        .unwrap_or(inputs.pattern_type)
}

#[derive(Default)]
struct Buckets {
    required: Vec<JobRef>,
    optional: Vec<JobRef>,
}

impl Buckets {
    fn add(&mut self, required: bool, job: JobRef) {
        if required {
            self.required.push(job);
        } else {
            self.optional.push(job);
        }
    }
}

/// Compile one basic query (given as nodes) into its leaves, split into
/// required and optional sets.
pub fn to_search_job(args: &Args, nodes: &[Node]) -> Result<JobRef, CompileError> {
    let config = &args.config;
    let inputs = &args.inputs;
    let basic = to_basic_query(nodes)?;
    let max_results = max_results(&basic, args)?;

    let (types, _) = basic.string_values(field::TYPE);
    let mut search_type = search_type_of(&basic, inputs);
    let result_types = compute_result_types(&types, &basic.pattern_string(), search_type)?;
    let mut info = to_text_pattern_info(&basic, result_types, search_type, max_results)?;
    if info.pattern.is_empty() {
        // empty structural patterns search repositories and files literally
        search_type = SearchType::Literal;
        info.is_structural_pat = false;
    }

    let use_full_deadline = basic.exists(field::TIMEOUT)
        || basic.exists(field::COUNT)
        || inputs.protocol == Protocol::Streaming;
    let content_based_lang = inputs.feature(CONTENT_BASED_LANG_FLAG);
    let repo_options = to_repo_options(&basic, &inputs.user_settings)?;
    let flags = job_mode(&basic, result_types, search_type, inputs.hosted)?;
    let use_index = basic.index()?;
    let ref_globs = basic.contains_ref_globs();
    let select = (!info.select.is_empty()).then(|| info.select.clone());
    let indexed_opts = |kind| IndexedSearchOptions {
        kind,
        file_match_limit: info.limit,
        select: select.clone(),
    };
    let pager = |child: JobRef| {
        RepoPager::new(
            child,
            repo_options.clone(),
            use_index,
            ref_globs,
            config.repo_page_size,
        )
    };

    let text = ResultTypes::FILE | ResultTypes::PATH;
    let mut jobs = Buckets::default();

    if flags.repo_universe_search {
        let scope = default_global_scope(&repo_options);
        let include_private = matches!(repo_options.visibility, Visibility::Private | Visibility::Any);
        if result_types.has(text) {
            jobs.add(
                true,
                GlobalIndexedSearch::new(
                    to_indexed_query(&info, IndexedKind::Text, content_based_lang)?,
                    scope.clone(),
                    include_private,
                    repo_options.clone(),
                    indexed_opts(IndexedKind::Text),
                ),
            );
        }
        if result_types.has(ResultTypes::SYMBOL) {
            jobs.add(
                true,
                GlobalIndexedSearch::new(
                    to_indexed_query(&info, IndexedKind::Symbol, content_based_lang)?,
                    scope,
                    include_private,
                    repo_options.clone(),
                    indexed_opts(IndexedKind::Symbol),
                ),
            );
        }
    }

    if result_types.has(text) && !flags.skip_repo_subset_search {
        let mut children = Vec::new();
        if !flags.only_run_searcher {
            children.push(IndexedSubsetSearch::new(
                to_indexed_query(&info, IndexedKind::Text, content_based_lang)?,
                indexed_opts(IndexedKind::Text),
            ));
        }
        children.push(
            SearcherJob::new(
                info.clone(),
                use_full_deadline,
                config.searcher_fetch_timeout(),
                config.searcher_concurrency,
            )
            .into_ref(),
        );
        jobs.add(true, pager(Parallel::new(children)));
    }

    if result_types.has(ResultTypes::SYMBOL) && !info.pattern.is_empty() && !flags.skip_repo_subset_search {
        let mut children = Vec::new();
        if !flags.only_run_searcher {
            children.push(IndexedSubsetSearch::new(
                to_indexed_query(&info, IndexedKind::Symbol, content_based_lang)?,
                indexed_opts(IndexedKind::Symbol),
            ));
        }
        children.push(SymbolSearcherJob::new(
            info.clone(),
            max_results,
            config.searcher_concurrency,
        ));
        let required = use_full_deadline || result_types.is_only(ResultTypes::SYMBOL);
        jobs.add(required, pager(Parallel::new(children)));
    }

    if result_types.has(ResultTypes::COMMIT | ResultTypes::DIFF) {
        let diff = result_types.has(ResultTypes::DIFF);
        let required = use_full_deadline
            || if diff {
                result_types.is_only(ResultTypes::DIFF)
            } else {
                result_types.is_only(ResultTypes::COMMIT)
            };
        jobs.add(
            required,
            CommitSearchJob::new(
                to_commit_query(&basic, diff, search_type, Utc::now())?,
                repo_options.clone(),
                diff,
                basic.exists(field::AFTER) || basic.exists(field::BEFORE),
                info.limit,
                inputs.sub_repo_perms,
                config.repo_page_size,
                config.searcher_concurrency,
            ),
        );
    }

    if search_type == SearchType::Structural && !info.pattern.is_empty() {
        jobs.add(
            true,
            StructuralSearchJob::new(
                info.clone(),
                use_full_deadline,
                config.searcher_fetch_timeout(),
                config.searcher_concurrency,
                repo_options.clone(),
                use_index,
                ref_globs,
                !flags.only_run_searcher,
                config.repo_page_size,
            ),
        );
    }

    if result_types.has(ResultTypes::REPO) {
        if let Some(job) = repo_search_job(&basic, &info, &repo_options, flags, config) {
            jobs.add(true, job);
        }
    }

    jobs.add(true, ComputeExcludedRepos::new(repo_options));

    let job = Priority::new(Parallel::new(jobs.required), Parallel::new(jobs.optional))
        .with_grace(config.optional_grace())
        .into_ref();
    Ok(if inputs.sub_repo_perms {
        Filter::new(job)
    } else {
        job
    })
}

fn repo_search_job(
    basic: &Basic,
    info: &PatternInfo,
    repo_options: &RepoOptions,
    flags: StrategyFlags,
    config: &EngineConfig,
) -> Option<JobRef> {
    let mut allowed = true;
    basic.visit_parameters(|p| allowed &= REPO_SEARCH_FIELDS.contains(&p.field.as_str()));
    if !allowed {
        return None;
    }
    let repo_options =
        add_pattern_as_repo_filter(&info.pattern, repo_options, basic.is_case_sensitive())?;
    let mode = if flags.skip_repo_subset_search {
        RepoSearchMode::SkipUnindexed
    } else if flags.repo_universe_search {
        RepoSearchMode::IndexedGlobal
    } else {
        RepoSearchMode::Default
    };
    Some(RepoSearchJob::new(repo_options, mode, config.repo_page_size))
}

fn operands_of(basic: &Basic) -> &[Node] {
    match &basic.pattern {
        Some(Node::Operator { operands, .. }) => operands,
        _ => &[],
    }
}

/// Each operand capped at the AND operand limit, intersected.
fn to_and_job(args: &Args, basic: &Basic) -> Result<JobRef, CompileError> {
    let operands = operands_of(basic)
        .iter()
        .map(|operand| {
            let job = to_pattern_expression_job(args, &basic.map_pattern(operand.clone()))?;
            Ok(Limit::new(args.config.and_operand_limit, job))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(And::new(operands))
}

fn to_or_job(args: &Args, basic: &Basic) -> Result<JobRef, CompileError> {
    let operands = operands_of(basic)
        .iter()
        .map(|operand| to_pattern_expression_job(args, &basic.map_pattern(operand.clone())))
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Or::new(operands))
}

/// Compile the pattern expression of a basic query by structural recursion.
pub fn to_pattern_expression_job(args: &Args, basic: &Basic) -> Result<JobRef, CompileError> {
    match &basic.pattern {
        Some(Node::Operator { operands, .. }) if operands.is_empty() => Ok(Arc::new(Noop)),
        Some(Node::Operator {
            op: OperatorKind::And,
            ..
        }) => to_and_job(args, basic),
        Some(Node::Operator {
            op: OperatorKind::Or,
            ..
        }) => to_or_job(args, basic),
        Some(Node::Operator {
            op: OperatorKind::Concat,
            ..
        })
        | Some(Node::Pattern(_)) => to_search_job(args, &basic.to_nodes()),
        Some(Node::Parameter(_)) | None => Ok(Arc::new(Noop)),
    }
}

/// `Timeout(Limit(Select?(job)))` for one basic query.
pub fn to_evaluate_job(args: &Args, basic: &Basic) -> Result<JobRef, CompileError> {
    let max_results = max_results(basic, args)?;
    let timeout = timeout_duration(basic, &args.config)?;

    let mut job = match basic.pattern {
        None => to_search_job(args, &basic.to_nodes())?,
        Some(_) => to_pattern_expression_job(args, basic)?,
    };
    if let Some(select) = basic.string_value(field::SELECT) {
        job = Select::new(SelectPath::parse(select)?, job);
    }
    Ok(Timeout::new(timeout, Limit::new(max_results, job)))
}

/// `Alert(Or(...))` over the evaluate jobs of every basic query in a plan.
pub fn from_expanded_plan(args: &Args, plan: &Plan) -> Result<JobRef, CompileError> {
    let children = plan
        .iter()
        .map(|basic| to_evaluate_job(args, basic))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AlertJob::new(args.inputs.query_string.clone(), Or::new(children)))
}

/// Compile a parsed query into a job tree.
pub fn compile(nodes: &[Node], args: &Args) -> SearchResult<JobRef> {
    let start = Instant::now();
    let query = if args.inputs.query_string.is_empty() {
        nodes_to_string(nodes)
    } else {
        args.inputs.query_string.clone()
    };

    let compiled = expand_plan(nodes).and_then(|plan| from_expanded_plan(args, &plan));
    match compiled {
        Ok(job) => {
            obs::emit_compile_finished(&query, job.name(), start.elapsed().as_micros() as u64);
            Ok(job)
        }
        Err(e) => {
            obs::emit_compile_failed(&query, &e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::printer::sexp;

    fn args() -> Args {
        Args::default()
    }

    fn names(job: &JobRef, out: &mut Vec<&'static str>) {
        out.push(job.name());
        for child in job.children() {
            names(&child, out);
        }
    }

    fn job_names(job: &JobRef) -> Vec<&'static str> {
        let mut out = Vec::new();
        names(job, &mut out);
        out
    }

    #[test]
    fn test_timeout_duration() {
        let config = EngineConfig::default();
        let b = to_basic_query(&[Node::pattern("x")]).unwrap();
        assert_eq!(timeout_duration(&b, &config).unwrap(), config.default_timeout());

        let b = to_basic_query(&[Node::parameter("count", "10"), Node::pattern("x")]).unwrap();
        assert_eq!(timeout_duration(&b, &config).unwrap(), config.max_timeout());

        let b = to_basic_query(&[Node::parameter("timeout", "5s")]).unwrap();
        assert_eq!(timeout_duration(&b, &config).unwrap(), Duration::from_secs(5));

        let b = to_basic_query(&[Node::parameter("timeout", "10m")]).unwrap();
        assert_eq!(timeout_duration(&b, &config).unwrap(), config.max_timeout());
    }

    #[test]
    fn test_default_limit_by_protocol() {
        let config = EngineConfig::default();
        let mut inputs = SearchInputs::default();
        assert_eq!(inputs.default_limit(&config), 30);
        inputs.protocol = Protocol::Streaming;
        assert_eq!(inputs.default_limit(&config), 500);
    }

    #[test]
    fn test_global_query_selects_universe_search() {
        let job = to_search_job(&args(), &[Node::pattern("foo")]).unwrap();
        let names = job_names(&job);
        assert!(names.contains(&"GlobalTextSearch"));
        // the searcher still covers unindexed repositories
        assert!(names.contains(&"SearcherJob"));
        assert!(!names.contains(&"IndexedSubsetTextSearch"));
    }

    #[test]
    fn test_hosted_global_query_skips_repo_pages() {
        let a = Args {
            inputs: SearchInputs {
                hosted: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let job = to_search_job(&a, &[Node::pattern("foo")]).unwrap();
        let names = job_names(&job);
        assert!(names.contains(&"GlobalTextSearch"));
        assert!(!names.contains(&"RepoPager"));
    }

    #[test]
    fn test_repo_scoped_query_uses_pager() {
        let job = to_search_job(&args(), &[Node::parameter("repo", "acme"), Node::pattern("foo")])
            .unwrap();
        let names = job_names(&job);
        assert!(!names.contains(&"GlobalTextSearch"));
        assert!(names.contains(&"RepoPager"));
        assert!(names.contains(&"IndexedSubsetTextSearch"));
        assert!(names.contains(&"RepoSearch"));
        assert!(names.contains(&"ComputeExcludedRepos"));
    }

    #[test]
    fn test_optional_commit_search() {
        let nodes = [
            Node::parameter("type", "symbol"),
            Node::parameter("type", "commit"),
            Node::pattern("foo"),
        ];
        let job = to_search_job(&args(), &nodes).unwrap();
        assert_eq!(job.name(), "Priority");
        let children = job.children();
        assert!(!job_names(&children[0]).contains(&"CommitSearch"));
        assert!(job_names(&children[1]).contains(&"CommitSearch"));

        // streaming uses the full deadline, so nothing is optional
        let streaming = Args {
            inputs: SearchInputs {
                protocol: Protocol::Streaming,
                ..Default::default()
            },
            ..Default::default()
        };
        let job = to_search_job(&streaming, &nodes).unwrap();
        assert_eq!(job.children()[1].name(), "Noop");
    }

    #[test]
    fn test_repo_search_only_with_allowed_fields() {
        let job = to_search_job(&args(), &[Node::parameter("file", "go"), Node::pattern("foo")])
            .unwrap();
        assert!(!job_names(&job).contains(&"RepoSearch"));

        let job = to_search_job(&args(), &[Node::pattern("@v1")]).unwrap();
        assert!(!job_names(&job).contains(&"RepoSearch"));
    }

    #[test]
    fn test_sub_repo_perms_adds_filter() {
        let a = Args {
            inputs: SearchInputs {
                sub_repo_perms: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let job = to_search_job(&a, &[Node::pattern("foo")]).unwrap();
        assert_eq!(job.name(), "Filter");
    }

    #[test]
    fn test_structural_pattern() {
        let a = Args {
            inputs: SearchInputs {
                pattern_type: SearchType::Structural,
                ..Default::default()
            },
            ..Default::default()
        };
        let job = to_search_job(&a, &[Node::pattern("foo(:[args])")]).unwrap();
        let names = job_names(&job);
        assert!(names.contains(&"StructuralSearch"));
        assert!(!names.contains(&"GlobalTextSearch"));

        // an empty structural pattern falls back to literal search
        let job = to_search_job(&a, &[Node::parameter("repo", "acme")]).unwrap();
        assert!(!job_names(&job).contains(&"StructuralSearch"));
    }

    #[test]
    fn test_and_or_expressions() {
        let and = to_basic_query(&[Node::and(vec![Node::pattern("a"), Node::pattern("b")])]).unwrap();
        let job = to_pattern_expression_job(&args(), &and).unwrap();
        assert_eq!(job.name(), "And");
        assert!(job.children().iter().all(|c| c.name() == "Limit"));
        assert_eq!(job.children()[0].fields(), vec![("limit", "40000".to_string())]);

        let or = to_basic_query(&[Node::or(vec![Node::pattern("a"), Node::pattern("b")])]).unwrap();
        let job = to_pattern_expression_job(&args(), &or).unwrap();
        assert_eq!(job.name(), "Or");
        assert_eq!(job.children().len(), 2);

        let empty = Basic::new(vec![], Some(Node::and(vec![])));
        assert_eq!(to_pattern_expression_job(&args(), &empty).unwrap().name(), "Noop");
    }

    #[test]
    fn test_evaluate_job_wrapping() {
        let b = to_basic_query(&[Node::parameter("select", "repo"), Node::pattern("foo")]).unwrap();
        let job = to_evaluate_job(&args(), &b).unwrap();
        assert_eq!(job.name(), "Timeout");
        let limit = &job.children()[0];
        assert_eq!(limit.name(), "Limit");
        assert_eq!(limit.fields(), vec![("limit", "30".to_string())]);
        assert_eq!(limit.children()[0].name(), "Select");
    }

    #[test]
    fn test_compile_errors() {
        let regex = Args {
            inputs: SearchInputs {
                pattern_type: SearchType::Regex,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(compile(&[Node::pattern("(")], &regex).is_err());
        assert!(compile(&[Node::parameter("count", "lots")], &args()).is_err());
        assert!(compile(&[Node::parameter("timeout", "soon")], &args()).is_err());
        assert!(compile(&[Node::parameter("select", "nothing")], &args()).is_err());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let nodes = vec![
            Node::parameter("repo", "acme"),
            Node::or(vec![Node::pattern("foo"), Node::pattern("bar")]),
        ];
        let first = sexp(compile(&nodes, &args()).unwrap().as_ref());
        let second = sexp(compile(&nodes, &args()).unwrap().as_ref());
        assert_eq!(first, second);
        assert!(first.starts_with("(ALERT"));
    }
}
