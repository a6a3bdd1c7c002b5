//! Structured observability hooks for the search lifecycle.
//!
//! This module provides:
//! - Search-scoped tracing spans via the `SearchSpan` RAII guard, or
//!   `search_span` for instrumenting async blocks
//! - Emission functions for compile, job and alert events
//!
//! Events use an `event = "..."` field so they can be filtered in JSON logs.

use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::alert::Alert;

/// RAII guard that enters a search-scoped span.
///
/// ```ignore
/// let _span = SearchSpan::enter(ctx.search_id());
/// ```
pub struct SearchSpan {
    _span: tracing::span::EnteredSpan,
}

impl SearchSpan {
    pub fn enter(search_id: Uuid) -> Self {
        Self {
            _span: search_span(search_id).entered(),
        }
    }
}

/// Span tagged with the search id, for use with `Instrument`.
pub fn search_span(search_id: Uuid) -> Span {
    tracing::info_span!("quarry.search", search_id = %search_id)
}

pub fn emit_compile_finished(query: &str, job: &str, duration_us: u64) {
    info!(
        event = "compile.finished",
        query = %query,
        job = %job,
        duration_us = duration_us,
    );
}

pub fn emit_compile_failed(query: &str, error: &dyn std::fmt::Display) {
    warn!(event = "compile.failed", query = %query, error = %error);
}

pub fn emit_job_started(job: &'static str) {
    debug!(event = "job.started", job = job);
}

pub fn emit_job_finished(job: &'static str, duration_ms: u64, alert: bool) {
    debug!(
        event = "job.finished",
        job = job,
        duration_ms = duration_ms,
        alert = alert,
    );
}

pub fn emit_job_failed(job: &'static str, error: &dyn std::fmt::Display) {
    debug!(event = "job.failed", job = job, error = %error);
}

pub fn emit_alert_raised(alert: &Alert) {
    info!(
        event = "alert.raised",
        priority = alert.priority,
        title = %alert.title,
    );
}

pub fn emit_search_finished(search_id: Uuid, duration_ms: u64, results: usize, success: bool) {
    info!(
        event = "search.finished",
        search_id = %search_id,
        duration_ms = duration_ms,
        results = results,
        success = success,
    );
}
