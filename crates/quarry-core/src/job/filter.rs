use std::sync::Arc;

use async_trait::async_trait;
use quarry_backend::{Actor, RepoRef, SubRepoPermissionChecker};

use super::{run_job, Job, JobRef, JobResult};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::result::Match;
use crate::streaming::{SearchEvent, Sender, SharedSender};

/// Drops matches the actor may not read under sub-repository permissions.
pub struct Filter {
    child: JobRef,
}

impl Filter {
    pub fn new(child: JobRef) -> JobRef {
        Arc::new(Filter { child })
    }
}

struct PermissionSender {
    inner: SharedSender,
    checker: Arc<dyn SubRepoPermissionChecker>,
    actor: Actor,
}

impl PermissionSender {
    /// Checker errors count as unreadable.
    fn readable(&self, repo: &RepoRef, path: &str) -> bool {
        match self.checker.can_read(&self.actor, repo, path) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(repo = %repo.name, path, error = %e, "permission check failed");
                false
            }
        }
    }

    fn allowed(&self, m: &Match) -> bool {
        match m {
            Match::Repo(_) => true,
            Match::File(f) => self.readable(&f.repo, &f.path),
            Match::Commit(c) => {
                c.modified_files.is_empty()
                    || c.modified_files.iter().any(|p| self.readable(&c.repo, p))
            }
        }
    }
}

impl Sender for PermissionSender {
    fn send(&self, mut event: SearchEvent) {
        if self.checker.enabled() {
            event.results.retain(|m| self.allowed(m));
        }
        self.inner.send(event);
    }
}

#[async_trait]
impl Job for Filter {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let sender: SharedSender = Arc::new(PermissionSender {
            inner: stream.clone(),
            checker: clients.permissions.clone(),
            actor: ctx.actor().clone(),
        });
        run_job(self.child.as_ref(), ctx, clients, &sender).await
    }

    fn name(&self) -> &'static str {
        "Filter"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }
}
