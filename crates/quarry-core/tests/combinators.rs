//! Behavior of the combinator jobs against scripted child jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_backend::fakes::MemoryBackend;
use quarry_backend::{LineMatch, RepoRef};
use quarry_core::alert::{PRIORITY_PARTIAL, PRIORITY_TIMED_OUT};
use quarry_core::job::{And, Limit, Or, Parallel, Priority, Select, Timeout};
use quarry_core::result::FileMatch;
use quarry_core::{
    collect, Clients, Job, JobRef, JobResult, Match, SearchContext, SearchError, SearchEvent,
    SelectPath, Sender, SharedSender,
};

fn clients() -> Clients {
    Clients::from_memory(Arc::new(MemoryBackend::new(vec![])))
}

fn file(repo: u32, path: &str, line: u32) -> Match {
    Match::File(FileMatch {
        repo: RepoRef::new(repo, format!("github.com/acme/r{repo}")),
        rev: None,
        commit: String::new(),
        path: path.to_string(),
        line_matches: vec![LineMatch {
            preview: format!("{path} line {line}"),
            line_number: line,
            offset_and_lengths: vec![[0, 1]],
        }],
        symbols: vec![],
        limit_hit: false,
    })
}

fn paths(results: &[Match]) -> Vec<String> {
    let mut out: Vec<String> = results
        .iter()
        .filter_map(|m| m.key().path)
        .collect();
    out.sort();
    out
}

/// Sends each batch in order, then succeeds.
struct Emit(Vec<Vec<Match>>);

#[async_trait]
impl Job for Emit {
    async fn run(&self, _ctx: &SearchContext, _clients: &Clients, stream: &SharedSender) -> JobResult {
        for batch in &self.0 {
            stream.send(SearchEvent::results(batch.clone()));
            tokio::task::yield_now().await;
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Emit"
    }
}

fn emit(batches: Vec<Vec<Match>>) -> JobRef {
    Arc::new(Emit(batches))
}

/// Fails with a backend error.
struct Fail;

#[async_trait]
impl Job for Fail {
    async fn run(&self, _ctx: &SearchContext, _clients: &Clients, _stream: &SharedSender) -> JobResult {
        Err(SearchError::backend("fake", "connection refused"))
    }

    fn name(&self) -> &'static str {
        "Fail"
    }
}

fn fail() -> JobRef {
    Arc::new(Fail)
}

/// Sends one batch, then never finishes and ignores cancellation.
struct Hang(Vec<Match>);

#[async_trait]
impl Job for Hang {
    async fn run(&self, _ctx: &SearchContext, _clients: &Clients, stream: &SharedSender) -> JobResult {
        stream.send(SearchEvent::results(self.0.clone()));
        std::future::pending::<()>().await;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Hang"
    }
}

/// Sends batches of ten until its context is canceled.
struct Flood {
    saw_cancel: Arc<AtomicBool>,
}

#[async_trait]
impl Job for Flood {
    async fn run(&self, ctx: &SearchContext, _clients: &Clients, stream: &SharedSender) -> JobResult {
        for round in 0..1000u32 {
            if ctx.is_done() {
                self.saw_cancel.store(true, Ordering::SeqCst);
                return Err(ctx.err());
            }
            let batch = (0..10)
                .map(|i| file(1, &format!("f{round}_{i}.go"), 0))
                .collect();
            stream.send(SearchEvent::results(batch));
            tokio::task::yield_now().await;
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Flood"
    }
}

#[tokio::test]
async fn test_parallel_forwards_everything() {
    let job = Parallel::new(vec![
        emit(vec![vec![file(1, "a.go", 0)], vec![file(1, "b.go", 0)]]),
        emit(vec![vec![file(2, "c.go", 0)]]),
    ]);
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(paths(&out.results), vec!["a.go", "b.go", "c.go"]);
    assert!(out.alert.is_none());
}

#[tokio::test]
async fn test_parallel_fails_if_any_child_fails() {
    let job = Parallel::new(vec![emit(vec![vec![file(1, "a.go", 0)]]), fail()]);
    let err = collect(&job, &SearchContext::background(), &clients())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Backend { .. }));
}

#[tokio::test]
async fn test_and_keeps_keys_present_in_every_operand() {
    let job = And::new(vec![
        emit(vec![vec![file(1, "a.go", 1), file(1, "b.go", 1)], vec![file(2, "c.go", 1)]]),
        emit(vec![vec![file(1, "b.go", 7), file(2, "c.go", 2), file(2, "d.go", 1)]]),
    ]);
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(paths(&out.results), vec!["b.go", "c.go"]);

    // matches for the same file are merged
    let b = out
        .results
        .iter()
        .find(|m| m.key().path.as_deref() == Some("b.go"))
        .unwrap();
    assert_eq!(b.result_count(), 2);
}

#[tokio::test]
async fn test_and_fails_if_an_operand_fails() {
    let job = And::new(vec![emit(vec![vec![file(1, "a.go", 0)]]), fail()]);
    assert!(collect(&job, &SearchContext::background(), &clients()).await.is_err());
}

#[tokio::test]
async fn test_or_is_the_union_of_operands() {
    let job = Or::new(vec![
        emit(vec![vec![file(1, "a.go", 0), file(1, "b.go", 0)]]),
        emit(vec![vec![file(1, "b.go", 0), file(2, "c.go", 0)]]),
    ]);
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(paths(&out.results), vec!["a.go", "b.go", "c.go"]);
}

#[tokio::test]
async fn test_or_partial_failure_is_an_alert() {
    let job = Or::new(vec![emit(vec![vec![file(1, "a.go", 0)]]), fail()]);
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(paths(&out.results), vec!["a.go"]);
    assert_eq!(out.alert.unwrap().priority, PRIORITY_PARTIAL);

    let all_fail = Or::new(vec![fail(), fail()]);
    assert!(collect(&all_fail, &SearchContext::background(), &clients())
        .await
        .is_err());
}

#[tokio::test]
async fn test_limit_caps_results_and_cancels_child() {
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let job = Limit::new(
        25,
        Arc::new(Flood {
            saw_cancel: saw_cancel.clone(),
        }),
    );
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(out.results.len(), 25);
    assert!(out.stats.is_limit_hit);
    assert!(out.alert.is_none());
    assert!(saw_cancel.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_limit_truncates_line_matches() {
    let mut many = file(1, "a.go", 0);
    if let Match::File(f) = &mut many {
        f.line_matches = (0..5)
            .map(|n| LineMatch {
                preview: String::new(),
                line_number: n,
                offset_and_lengths: vec![],
            })
            .collect();
    }
    let job = Limit::new(3, emit(vec![vec![many]]));
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(out.results[0].result_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_returns_for_a_child_that_never_finishes() {
    let started = tokio::time::Instant::now();
    let job = Timeout::new(
        Duration::from_secs(2),
        Arc::new(Hang(vec![file(1, "early.go", 0)])) as JobRef,
    );
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));
    assert_eq!(paths(&out.results), vec!["early.go"]);
    assert_eq!(out.alert.unwrap().priority, PRIORITY_TIMED_OUT);
}

/// Waits for its context to end, then takes a moment to flush a last batch.
struct SlowUnwind {
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl Job for SlowUnwind {
    async fn run(&self, ctx: &SearchContext, _clients: &Clients, stream: &SharedSender) -> JobResult {
        ctx.done().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.send(SearchEvent::results(vec![file(1, "flushed.go", 0)]));
        self.finished.store(true, Ordering::SeqCst);
        Err(ctx.err())
    }

    fn name(&self) -> &'static str {
        "SlowUnwind"
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_waits_for_children_to_unwind() {
    let finished = Arc::new(AtomicBool::new(false));
    let child: JobRef = Arc::new(SlowUnwind {
        finished: finished.clone(),
    });
    let job = Timeout::new(
        Duration::from_secs(1),
        Parallel::new(vec![emit(vec![vec![file(1, "early.go", 0)]]), child]),
    );
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(paths(&out.results), vec!["early.go", "flushed.go"]);
    assert_eq!(out.alert.unwrap().priority, PRIORITY_TIMED_OUT);
}

#[tokio::test(start_paused = true)]
async fn test_priority_optional_failure_is_an_alert() {
    let job = Priority::new(emit(vec![vec![file(1, "a.go", 0)]]), fail()).into_ref();
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(paths(&out.results), vec!["a.go"]);
    assert_eq!(out.alert.unwrap().priority, PRIORITY_PARTIAL);
}

#[tokio::test(start_paused = true)]
async fn test_priority_cuts_off_slow_optional_jobs() {
    let job = Priority::new(
        emit(vec![vec![file(1, "a.go", 0)]]),
        Arc::new(Hang(vec![file(2, "slow.go", 0)])),
    )
    .with_grace(Duration::from_millis(100))
    .into_ref();
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    // the optional job's early results are still delivered
    assert_eq!(paths(&out.results), vec!["a.go", "slow.go"]);
    assert_eq!(out.alert.unwrap().priority, PRIORITY_PARTIAL);
}

#[tokio::test]
async fn test_priority_required_failure_is_an_error() {
    let job = Priority::new(fail(), emit(vec![vec![file(1, "a.go", 0)]])).into_ref();
    assert!(collect(&job, &SearchContext::background(), &clients()).await.is_err());
}

#[tokio::test]
async fn test_select_repo_dedupes() {
    let job = Select::new(
        SelectPath::Repo,
        emit(vec![vec![file(1, "a.go", 0), file(1, "b.go", 0), file(2, "c.go", 0)]]),
    );
    let out = collect(&job, &SearchContext::background(), &clients()).await.unwrap();
    assert_eq!(out.results.len(), 2);
    assert!(out.results.iter().all(|m| matches!(m, Match::Repo(_))));
}
