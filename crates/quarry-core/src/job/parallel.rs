use std::sync::Arc;

use async_trait::async_trait;

use super::{Children, Job, JobRef, JobResult, Noop, ScopedRepos};
use crate::alert::max_alert;
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::streaming::SharedSender;

/// Runs every child concurrently and forwards their events as they arrive.
/// The first child error cancels the siblings and fails the job.
pub struct Parallel {
    children: Vec<JobRef>,
}

impl Parallel {
    /// Collapses to `Noop` with no children and to the child itself with one.
    pub fn new(mut children: Vec<JobRef>) -> JobRef {
        match children.len() {
            0 => Arc::new(Noop),
            1 => children.remove(0),
            _ => Arc::new(Parallel { children }),
        }
    }
}

#[async_trait]
impl Job for Parallel {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let ctx = ctx.child();
        let mut tasks = Children::new();
        for (i, child) in self.children.iter().enumerate() {
            tasks.spawn(i, child.clone(), ctx.clone(), clients.clone(), stream.clone());
        }

        let mut alert = None;
        while let Some((_, result)) = tasks.join_next().await {
            match result {
                Ok(a) => alert = max_alert(alert, a),
                Err(e) => {
                    ctx.cancel();
                    tasks.shutdown().await;
                    return Err(e);
                }
            }
        }
        Ok(alert)
    }

    fn name(&self) -> &'static str {
        "Parallel"
    }

    fn children(&self) -> Vec<JobRef> {
        self.children.clone()
    }

    fn with_repos(&self, repos: &Arc<ScopedRepos>) -> Option<JobRef> {
        let children = self
            .children
            .iter()
            .map(|c| c.with_repos(repos).unwrap_or_else(|| c.clone()))
            .collect();
        Some(Parallel::new(children))
    }
}
