use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{run_job, Children, Job, JobRef, JobResult};
use crate::alert::{max_alert, Alert};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::streaming::SharedSender;

const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Runs a required and an optional job concurrently.
///
/// Only a required failure fails the job. Once the required job is done the
/// optional job gets `grace` to finish; after that it is cancelled and an
/// alert reports that results may be missing. Optional failures also become
/// alerts.
pub struct Priority {
    required: JobRef,
    optional: JobRef,
    grace: Duration,
}

impl Priority {
    pub fn new(required: JobRef, optional: JobRef) -> Self {
        Self {
            required,
            optional,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn into_ref(self) -> JobRef {
        Arc::new(self)
    }
}

fn optional_alert(ctx: &SearchContext, result: JobResult) -> Option<Alert> {
    match result {
        Ok(alert) => alert,
        Err(SearchError::Canceled) if ctx.is_done() => None,
        Err(e) if e.is_softenable() => e.to_alert(),
        Err(e) => {
            tracing::warn!(error = %e, "optional search job failed");
            Some(Alert::optional_failed(&e))
        }
    }
}

#[async_trait]
impl Job for Priority {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let optional_ctx = ctx.child();
        let mut optional = Children::new();
        optional.spawn(
            0,
            self.optional.clone(),
            optional_ctx.clone(),
            clients.clone(),
            stream.clone(),
        );

        let required = run_job(self.required.as_ref(), ctx, clients, stream).await;
        let mut alert = match required {
            Ok(alert) => alert,
            Err(e) => {
                optional_ctx.cancel();
                optional.shutdown().await;
                return Err(e);
            }
        };

        match tokio::time::timeout(self.grace, optional.join_next()).await {
            Ok(Some((_, result))) => alert = max_alert(alert, optional_alert(ctx, result)),
            Ok(None) => {}
            Err(_) => {
                optional_ctx.cancel();
                optional.shutdown().await;
                alert = max_alert(alert, Some(Alert::optional_cut_off(self.grace)));
            }
        }
        Ok(alert)
    }

    fn name(&self) -> &'static str {
        "Priority"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.required.clone(), self.optional.clone()]
    }
}
