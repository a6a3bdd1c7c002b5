use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{run_job, Job, JobRef, JobResult};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::result::{MatchKey, SelectPath};
use crate::streaming::{SearchEvent, Sender, SharedSender};

/// Projects every match through a `select:` path.
pub struct Select {
    path: SelectPath,
    child: JobRef,
}

impl Select {
    pub fn new(path: SelectPath, child: JobRef) -> JobRef {
        Arc::new(Select { path, child })
    }
}

struct SelectSender {
    inner: SharedSender,
    path: SelectPath,
    seen: Mutex<HashSet<MatchKey>>,
}

impl Sender for SelectSender {
    fn send(&self, event: SearchEvent) {
        let mut projected: Vec<_> = event
            .results
            .into_iter()
            .filter_map(|m| self.path.project(m))
            .collect();
        if self.path.dedupes() {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            projected.retain(|m| seen.insert(m.key()));
        }
        self.inner.send(SearchEvent {
            results: projected,
            stats: event.stats,
        });
    }
}

#[async_trait]
impl Job for Select {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let sender: SharedSender = Arc::new(SelectSender {
            inner: stream.clone(),
            path: self.path.clone(),
            seen: Mutex::new(HashSet::new()),
        });
        run_job(self.child.as_ref(), ctx, clients, &sender).await
    }

    fn name(&self) -> &'static str {
        "Select"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("select", self.path.to_string())]
    }
}
