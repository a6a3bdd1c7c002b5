use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Children, Job, JobRef, JobResult, Noop};
use crate::alert::{max_alert, Alert};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::result::{Match, MatchKey};
use crate::streaming::{CollectingSender, SearchEvent, SharedSender, Stats};

/// Intersection of its operands.
///
/// Every operand is buffered; once all have finished, the matches whose key
/// appears in every operand are merged and sent as one event. Any operand
/// failure fails the job.
pub struct And {
    children: Vec<JobRef>,
}

impl And {
    pub fn new(mut children: Vec<JobRef>) -> JobRef {
        match children.len() {
            0 => Arc::new(Noop),
            1 => children.remove(0),
            _ => Arc::new(And { children }),
        }
    }
}

fn keyed(matches: Vec<Match>) -> BTreeMap<MatchKey, Match> {
    let mut out: BTreeMap<MatchKey, Match> = BTreeMap::new();
    for m in matches {
        let key = m.key();
        match out.get_mut(&key) {
            Some(existing) => existing.merge(m),
            None => {
                out.insert(key, m);
            }
        }
    }
    out
}

/// Matches whose key is present in every operand, merged across operands.
fn intersect(operands: Vec<Vec<Match>>) -> Vec<Match> {
    let mut sets: Vec<BTreeMap<MatchKey, Match>> = operands.into_iter().map(keyed).collect();
    let Some(first) = sets.first() else {
        return Vec::new();
    };
    let common: BTreeSet<MatchKey> = first
        .keys()
        .filter(|k| sets[1..].iter().all(|s| s.contains_key(*k)))
        .cloned()
        .collect();

    let mut merged: BTreeMap<MatchKey, Match> = BTreeMap::new();
    for set in sets.iter_mut() {
        for key in &common {
            if let Some(m) = set.remove(key) {
                match merged.get_mut(key) {
                    Some(existing) => existing.merge(m),
                    None => {
                        merged.insert(key.clone(), m);
                    }
                }
            }
        }
    }
    merged.into_values().collect()
}

#[async_trait]
impl Job for And {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let ctx = ctx.child();
        let sinks: Vec<Arc<CollectingSender>> = self
            .children
            .iter()
            .map(|_| Arc::new(CollectingSender::new()))
            .collect();

        let mut tasks = Children::new();
        for (i, child) in self.children.iter().enumerate() {
            let sink: SharedSender = sinks[i].clone();
            tasks.spawn(i, child.clone(), ctx.clone(), clients.clone(), sink);
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

        let mut stats = Stats::default();
        let mut operands = Vec::with_capacity(sinks.len());
        for sink in &sinks {
            let (results, s) = sink.take();
            stats.merge(&s);
            operands.push(results);
        }
        let results = intersect(operands);
        stream.send(SearchEvent { results, stats });
        Ok(alert)
    }

    fn name(&self) -> &'static str {
        "And"
    }

    fn children(&self) -> Vec<JobRef> {
        self.children.clone()
    }
}

/// Union of its operands. Events are forwarded as they arrive.
///
/// The job fails only if every operand fails; a partial failure becomes an
/// alert.
pub struct Or {
    children: Vec<JobRef>,
}

impl Or {
    pub fn new(mut children: Vec<JobRef>) -> JobRef {
        match children.len() {
            0 => Arc::new(Noop),
            1 => children.remove(0),
            _ => Arc::new(Or { children }),
        }
    }
}

#[async_trait]
impl Job for Or {
    async fn run(&self, ctx: &SearchContext, clients: &Clients, stream: &SharedSender) -> JobResult {
        let mut tasks = Children::new();
        for (i, child) in self.children.iter().enumerate() {
            tasks.spawn(i, child.clone(), ctx.child(), clients.clone(), stream.clone());
        }

        let mut alert = None;
        let mut errors: Vec<(usize, SearchError)> = Vec::new();
        while let Some((i, result)) = tasks.join_next().await {
            match result {
                Ok(a) => alert = max_alert(alert, a),
                Err(e) => errors.push((i, e)),
            }
        }

        if errors.is_empty() {
            return Ok(alert);
        }
        errors.sort_by_key(|(i, _)| *i);
        let failed = errors.len();
        let total = self.children.len();
        let (_, first) = errors.swap_remove(0);
        if failed == total {
            return Err(first);
        }
        if matches!(first, SearchError::Canceled) && ctx.is_done() {
            return Ok(alert);
        }
        Ok(max_alert(
            alert,
            first
                .to_alert()
                .or_else(|| Some(Alert::partial_or(failed, total, &first))),
        ))
    }

    fn name(&self) -> &'static str {
        "Or"
    }

    fn children(&self) -> Vec<JobRef> {
        self.children.clone()
    }
}
