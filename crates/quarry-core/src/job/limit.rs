use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{run_job, Job, JobRef, JobResult};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::metrics::METRICS;
use crate::streaming::{SearchEvent, Sender, SharedSender};

/// Forwards at most `limit` results, then cancels its child.
pub struct Limit {
    limit: usize,
    child: JobRef,
}

impl Limit {
    pub fn new(limit: usize, child: JobRef) -> JobRef {
        Arc::new(Limit { limit, child })
    }
}

struct LimitSender {
    inner: SharedSender,
    limit: usize,
    sent: AtomicUsize,
    hit: AtomicBool,
    ctx: SearchContext,
}

impl LimitSender {
    fn is_hit(&self) -> bool {
        self.hit.load(Ordering::SeqCst)
    }
}

impl Sender for LimitSender {
    fn send(&self, mut event: SearchEvent) {
        let count: usize = event.results.iter().map(|m| m.result_count()).sum();
        if count == 0 {
            self.inner.send(event);
            return;
        }

        let before = self.sent.fetch_add(count, Ordering::SeqCst);
        if before >= self.limit {
            event.results.clear();
            if !event.stats.is_empty() {
                self.inner.send(event);
            }
            return;
        }
        if before + count < self.limit {
            self.inner.send(event);
            return;
        }

        let mut remaining = self.limit - before;
        let mut kept = Vec::with_capacity(event.results.len());
        for mut m in event.results.drain(..) {
            if remaining == 0 {
                break;
            }
            let c = m.result_count();
            if c > remaining {
                m.truncate(remaining);
                remaining = 0;
            } else {
                remaining -= c;
            }
            kept.push(m);
        }
        event.results = kept;
        event.stats.is_limit_hit = true;
        self.inner.send(event);

        if !self.hit.swap(true, Ordering::SeqCst) {
            METRICS.inc_limit_hits();
            tracing::debug!(limit = self.limit, "result limit reached");
        }
        self.ctx.cancel();
    }
}

#[async_trait]
impl Job for Limit {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let child_ctx = ctx.child();
        let sender = Arc::new(LimitSender {
            inner: stream.clone(),
            limit: self.limit,
            sent: AtomicUsize::new(0),
            hit: AtomicBool::new(false),
            ctx: child_ctx.clone(),
        });
        let limited: SharedSender = sender.clone();
        match run_job(self.child.as_ref(), &child_ctx, clients, &limited).await {
            Err(SearchError::Canceled) if sender.is_hit() && !ctx.is_done() => Ok(None),
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "Limit"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("limit", self.limit.to_string())]
    }
}
