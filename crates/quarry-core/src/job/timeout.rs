use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{run_job, Job, JobRef, JobResult};
use crate::alert::Alert;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::streaming::SharedSender;

/// How long an expired child gets to unwind after its context is canceled.
/// A child still running after that is aborted.
const TEARDOWN_GRACE: Duration = Duration::from_millis(50);

/// Bounds its child by a deadline.
///
/// The child's context carries the deadline, and the job itself stops
/// waiting at the deadline even if the child ignores it. Expiry is reported
/// as a "timed out" alert, never as an error.
pub struct Timeout {
    timeout: Duration,
    child: JobRef,
}

impl Timeout {
    pub fn new(timeout: Duration, child: JobRef) -> JobRef {
        Arc::new(Timeout { timeout, child })
    }
}

#[async_trait]
impl Job for Timeout {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let deadline = Instant::now() + self.timeout;
        let child_ctx = ctx.with_deadline(deadline);
        let run = run_job(self.child.as_ref(), &child_ctx, clients, stream);
        tokio::pin!(run);
        match tokio::time::timeout_at(deadline, &mut run).await {
            Ok(Err(SearchError::DeadlineExceeded)) => Ok(Some(Alert::timed_out(self.timeout))),
            Ok(Err(SearchError::Canceled)) if child_ctx.deadline_passed() => {
                Ok(Some(Alert::timed_out(self.timeout)))
            }
            Ok(result) => result,
            Err(_) => {
                child_ctx.cancel();
                // Dropping `run` aborts whatever is left of the child's tasks.
                let _ = tokio::time::timeout(TEARDOWN_GRACE, &mut run).await;
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "search timed out");
                Ok(Some(Alert::timed_out(self.timeout)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "Timeout"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("timeout", format!("{:?}", self.timeout))]
    }
}
