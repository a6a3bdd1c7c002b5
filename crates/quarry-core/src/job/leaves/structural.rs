use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_backend::{PatternInfo, RepoOptions};

use super::SearcherJob;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::job::{run_job, Job, JobRef, JobResult, RepoPager};
use crate::query::YesNoOnly;
use crate::streaming::SharedSender;

/// Structural search through the unindexed matcher.
///
/// Every repository revision is sent to the matcher, including indexed
/// ones. Indexed repositories are flagged as such so the matcher can use
/// the index to narrow candidate files, unless the indexed engine does not
/// take part in this search.
pub struct StructuralSearchJob {
    searcher: SearcherJob,
    repo_options: RepoOptions,
    use_index: YesNoOnly,
    contains_ref_globs: bool,
    not_searcher_only: bool,
    page_size: usize,
}

impl StructuralSearchJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pattern_info: PatternInfo,
        use_full_deadline: bool,
        fetch_timeout: Duration,
        concurrency: usize,
        repo_options: RepoOptions,
        use_index: YesNoOnly,
        contains_ref_globs: bool,
        not_searcher_only: bool,
        page_size: usize,
    ) -> JobRef {
        let pattern_info = PatternInfo {
            is_structural_pat: true,
            ..pattern_info
        };
        Arc::new(StructuralSearchJob {
            searcher: SearcherJob::new(pattern_info, use_full_deadline, fetch_timeout, concurrency)
                .searching_indexed(),
            repo_options,
            use_index,
            contains_ref_globs,
            not_searcher_only,
            page_size,
        })
    }
}

#[async_trait]
impl Job for StructuralSearchJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let use_index = if self.not_searcher_only {
            self.use_index
        } else {
            YesNoOnly::No
        };
        let pager = RepoPager::new(
            self.searcher.clone().into_ref(),
            self.repo_options.clone(),
            use_index,
            self.contains_ref_globs,
            self.page_size,
        );
        run_job(pager.as_ref(), ctx, clients, stream).await
    }

    fn name(&self) -> &'static str {
        "StructuralSearch"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.searcher.fields();
        fields.push(("repo_options", self.repo_options.describe()));
        fields.push(("index", self.use_index.as_str().to_string()));
        fields.push(("not_searcher_only", self.not_searcher_only.to_string()));
        fields
    }
}
