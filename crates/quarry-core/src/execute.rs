//! Running a compiled job tree
//!
//! - `execute`: run a job into a caller-supplied sender
//! - `execute_streaming`: run on a background task, events through a channel
//! - `collect`: run to completion and gather merged results for batch callers

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::alert::Alert;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchResult;
use crate::job::{run_job, JobRef, JobResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::result::{Match, MatchKey};
use crate::streaming::{ChannelSender, CollectingSender, SearchEvent, Sender, SharedSender, Stats};

struct CountingSender {
    inner: SharedSender,
    results: AtomicUsize,
}

impl Sender for CountingSender {
    fn send(&self, event: SearchEvent) {
        self.results.fetch_add(event.results.len(), Ordering::Relaxed);
        self.inner.send(event);
    }
}

/// Run `job` under a search-scoped span. The terminal value is the alert
/// of the whole tree, or the error that aborted it.
pub async fn execute(
    job: &JobRef,
    ctx: &SearchContext,
    clients: &Clients,
    stream: &SharedSender,
) -> JobResult {
    let started = Instant::now();
    let counter = Arc::new(CountingSender {
        inner: stream.clone(),
        results: AtomicUsize::new(0),
    });
    let counted: SharedSender = counter.clone();

    let result = run_job(job.as_ref(), ctx, clients, &counted)
        .instrument(obs::search_span(ctx.search_id()))
        .await;

    obs::emit_search_finished(
        ctx.search_id(),
        started.elapsed().as_millis() as u64,
        counter.results.load(Ordering::Relaxed),
        result.is_ok(),
    );
    METRICS.flush();
    result
}

/// Run `job` on its own task. Events arrive on the receiver as they are
/// produced; the handle yields the terminal alert or error.
pub fn execute_streaming(
    job: JobRef,
    ctx: SearchContext,
    clients: Clients,
) -> (mpsc::UnboundedReceiver<SearchEvent>, JoinHandle<JobResult>) {
    let (sender, rx) = ChannelSender::new();
    let stream: SharedSender = Arc::new(sender);
    let handle = tokio::spawn(async move { execute(&job, &ctx, &clients, &stream).await });
    (rx, handle)
}

/// Everything a batch search produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Matches in first-seen order; matches with the same key are merged
    pub results: Vec<Match>,
    pub stats: Stats,
    pub alert: Option<Alert>,
}

/// Merge matches that point at the same thing, keeping first-seen order.
pub fn merge_by_key(matches: Vec<Match>) -> Vec<Match> {
    let mut index: HashMap<MatchKey, usize> = HashMap::new();
    let mut out: Vec<Match> = Vec::with_capacity(matches.len());
    for m in matches {
        match index.get(&m.key()) {
            Some(&i) => out[i].merge(m),
            None => {
                index.insert(m.key(), out.len());
                out.push(m);
            }
        }
    }
    out
}

/// Run `job` to completion and gather its results.
pub async fn collect(job: &JobRef, ctx: &SearchContext, clients: &Clients) -> SearchResult<SearchOutcome> {
    let sink = Arc::new(CollectingSender::new());
    let stream: SharedSender = sink.clone();
    let alert = execute(job, ctx, clients, &stream).await?;
    let (results, stats) = sink.take();
    Ok(SearchOutcome {
        results: merge_by_key(results),
        stats,
        alert,
    })
}

#[cfg(test)]
mod tests {
    use quarry_backend::{LineMatch, RepoRef};

    use super::*;
    use crate::result::{FileMatch, RepoMatch};

    fn file(path: &str, line: u32) -> Match {
        Match::File(FileMatch {
            repo: RepoRef::new(1, "a"),
            rev: None,
            commit: String::new(),
            path: path.to_string(),
            line_matches: vec![LineMatch {
                preview: format!("line {line}"),
                line_number: line,
                offset_and_lengths: vec![[0, 4]],
            }],
            symbols: vec![],
            limit_hit: false,
        })
    }

    #[test]
    fn test_merge_by_key_keeps_first_seen_order() {
        let repo = Match::Repo(RepoMatch {
            repo: RepoRef::new(2, "b"),
            rev: None,
        });
        let merged = merge_by_key(vec![
            file("x.go", 1),
            repo.clone(),
            file("y.go", 3),
            file("x.go", 2),
            repo,
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].result_count(), 2);
        assert!(matches!(&merged[1], Match::Repo(_)));
        assert_eq!(merged[2].key().path.as_deref(), Some("y.go"));
    }
}
