//! Result stream and search statistics
//!
//! Jobs push `SearchEvent`s into a shared `Sender`. Senders are `Send +
//! Sync` and every `send` delivers one complete batch; combinators wrap the
//! sender they are given to filter, project, count or buffer events.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use quarry_backend::{ExcludedRepos, RepoRef};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::metrics::METRICS;
use crate::result::Match;

/// Progress information accumulated over a search. Merging is monotonic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub is_limit_hit: bool,
    /// Repositories that were searched
    pub repos: BTreeSet<RepoRef>,
    pub timedout: BTreeSet<RepoRef>,
    /// `repo@rev` strings of revisions that do not exist
    pub missing_revs: Vec<String>,
    pub excluded: ExcludedRepos,
    /// Repositories skipped because they are not indexed under `index:only`
    pub skipped_unindexed: BTreeSet<RepoRef>,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.is_limit_hit |= other.is_limit_hit;
        self.repos.extend(other.repos.iter().cloned());
        self.timedout.extend(other.timedout.iter().cloned());
        for rev in &other.missing_revs {
            if !self.missing_revs.contains(rev) {
                self.missing_revs.push(rev.clone());
            }
        }
        self.excluded.forks = self.excluded.forks.max(other.excluded.forks);
        self.excluded.archived = self.excluded.archived.max(other.excluded.archived);
        self.skipped_unindexed
            .extend(other.skipped_unindexed.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        *self == Stats::default()
    }
}

/// One batch of results with the stats observed alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub results: Vec<Match>,
    pub stats: Stats,
}

impl SearchEvent {
    pub fn results(results: Vec<Match>) -> Self {
        Self {
            results,
            stats: Stats::default(),
        }
    }

    pub fn stats(stats: Stats) -> Self {
        Self {
            results: Vec::new(),
            stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.stats.is_empty()
    }
}

/// Sink for search events.
pub trait Sender: Send + Sync {
    fn send(&self, event: SearchEvent);
}

pub type SharedSender = Arc<dyn Sender>;

/// Buffers every event. Used by batch callers and by buffering combinators.
#[derive(Debug, Default)]
pub struct CollectingSender {
    inner: Mutex<(Vec<Match>, Stats)>,
}

impl CollectingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything collected so far.
    pub fn take(&self) -> (Vec<Match>, Stats) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *inner)
    }

    pub fn results(&self) -> Vec<Match> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .clone()
    }

    pub fn stats(&self) -> Stats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone()
    }
}

impl Sender for CollectingSender {
    fn send(&self, event: SearchEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.0.extend(event.results);
        inner.1.merge(&event.stats);
    }
}

/// Forwards events into an unbounded channel. Sends after the receiver is
/// dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sender for ChannelSender {
    fn send(&self, event: SearchEvent) {
        if event.is_empty() {
            return;
        }
        METRICS.add_results_streamed(event.results.len() as u64);
        if self.tx.send(event).is_err() {
            tracing::trace!("result receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge_is_monotonic() {
        let mut a = Stats {
            missing_revs: vec!["a@v1".into()],
            ..Default::default()
        };
        let b = Stats {
            is_limit_hit: true,
            missing_revs: vec!["a@v1".into(), "b@v2".into()],
            excluded: ExcludedRepos {
                forks: 2,
                archived: 0,
            },
            ..Default::default()
        };
        a.merge(&b);
        a.merge(&Stats::default());
        assert!(a.is_limit_hit);
        assert_eq!(a.missing_revs, vec!["a@v1", "b@v2"]);
        assert_eq!(a.excluded.forks, 2);
    }

    #[test]
    fn test_collecting_sender_take() {
        let sink = CollectingSender::new();
        sink.send(SearchEvent::stats(Stats {
            is_limit_hit: true,
            ..Default::default()
        }));
        let (results, stats) = sink.take();
        assert!(results.is_empty());
        assert!(stats.is_limit_hit);
        assert!(!sink.stats().is_limit_hit);
    }

    #[tokio::test]
    async fn test_channel_sender_drops_empty_events() {
        let (tx, mut rx) = ChannelSender::new();
        tx.send(SearchEvent::default());
        tx.send(SearchEvent::stats(Stats {
            is_limit_hit: true,
            ..Default::default()
        }));
        drop(tx);
        let first = rx.recv().await.unwrap();
        assert!(first.stats.is_limit_hit);
        assert!(rx.recv().await.is_none());
    }
}
