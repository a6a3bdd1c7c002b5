//! Search-scoped cancellation and deadline
//!
//! A `SearchContext` is handed to every job. Cancelling a context cancels
//! every context derived from it; a derived deadline can only shrink.

use std::future::Future;
use std::time::Duration;

use quarry_backend::Actor;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{SearchError, SearchResult};

#[derive(Debug, Clone)]
pub struct SearchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    search_id: Uuid,
    actor: Actor,
}

impl SearchContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            search_id: Uuid::new_v4(),
            actor,
        }
    }

    /// Context for an internal actor with no deadline.
    pub fn background() -> Self {
        Self::new(Actor::internal())
    }

    /// A context cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            search_id: self.search_id,
            actor: self.actor.clone(),
        }
    }

    /// Child context whose deadline is the earlier of `deadline` and ours.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.child();
        ctx.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn search_id(&self) -> Uuid {
        self.search_id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    /// Why the context is done. Only meaningful once `is_done` holds.
    pub fn err(&self) -> SearchError {
        if self.deadline_passed() {
            SearchError::DeadlineExceeded
        } else {
            SearchError::Canceled
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Race `fut` against the context. The future is dropped if the context
    /// finishes first.
    pub async fn run<F, T>(&self, fut: F) -> SearchResult<T>
    where
        F: Future<Output = T>,
    {
        if self.is_done() {
            return Err(self.err());
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(self.err()),
            out = fut => Ok(out),
        }
    }
}
