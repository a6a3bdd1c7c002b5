use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{run_job, Job, JobRef, JobResult};
use crate::alert::{max_alert, Alert};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::metrics::METRICS;
use crate::obs;
use crate::streaming::{SearchEvent, Sender, SharedSender, Stats};

/// Root of a compiled search.
///
/// Passes events through while observing them, turns softenable errors into
/// alerts and derives an alert from the observed stats when a search ends
/// with nothing to show.
pub struct AlertJob {
    query: String,
    child: JobRef,
}

impl AlertJob {
    pub fn new(query: impl Into<String>, child: JobRef) -> JobRef {
        Arc::new(AlertJob {
            query: query.into(),
            child,
        })
    }
}

struct ObservingSender {
    inner: SharedSender,
    results: AtomicUsize,
    stats: Mutex<Stats>,
}

impl Sender for ObservingSender {
    fn send(&self, event: SearchEvent) {
        self.results
            .fetch_add(event.results.len(), Ordering::Relaxed);
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&event.stats);
        self.inner.send(event);
    }
}

fn alert_from_stats(stats: &Stats, results: usize) -> Option<Alert> {
    if !stats.missing_revs.is_empty() {
        return Some(Alert::missing_revisions(&stats.missing_revs));
    }
    if results > 0 {
        return None;
    }
    if !stats.timedout.is_empty() {
        return Some(Alert::repos_timed_out(stats.timedout.len()));
    }
    if stats.excluded.forks > 0 || stats.excluded.archived > 0 {
        return Some(Alert::excluded(stats.excluded.forks, stats.excluded.archived));
    }
    None
}

#[async_trait]
impl Job for AlertJob {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let observer = Arc::new(ObservingSender {
            inner: stream.clone(),
            results: AtomicUsize::new(0),
            stats: Mutex::new(Stats::default()),
        });
        let observed: SharedSender = observer.clone();

        let alert = match run_job(self.child.as_ref(), ctx, clients, &observed).await {
            Ok(alert) => alert,
            Err(e) if e.is_softenable() => e.to_alert(),
            Err(e) => return Err(e),
        };

        let stats = observer
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let results = observer.results.load(Ordering::Relaxed);
        let alert = max_alert(alert, alert_from_stats(&stats, results));
        if let Some(a) = &alert {
            METRICS.inc_alerts_raised();
            obs::emit_alert_raised(a);
        }
        Ok(alert)
    }

    fn name(&self) -> &'static str {
        "Alert"
    }

    fn children(&self) -> Vec<JobRef> {
        vec![self.child.clone()]
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("query", self.query.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_backend::{ExcludedRepos, RepoRef};

    #[test]
    fn test_alert_from_stats_prefers_missing_revs() {
        let stats = Stats {
            missing_revs: vec!["a@v9".into()],
            timedout: [RepoRef::new(1, "a")].into_iter().collect(),
            ..Default::default()
        };
        let alert = alert_from_stats(&stats, 3).unwrap();
        assert_eq!(alert.title, "Some revisions could not be found");
    }

    #[test]
    fn test_alert_from_stats_excluded_only_without_results() {
        let stats = Stats {
            excluded: ExcludedRepos {
                forks: 2,
                archived: 1,
            },
            ..Default::default()
        };
        assert!(alert_from_stats(&stats, 1).is_none());
        let alert = alert_from_stats(&stats, 0).unwrap();
        assert!(alert.description.contains("fork:yes"));
        assert!(alert.description.contains("archived:yes"));
    }
}
