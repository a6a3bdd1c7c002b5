//! Non-fatal search annotations
//!
//! An `Alert` tells the caller something about a search that is not an
//! error: it timed out, an optional backend failed, no repositories
//! matched. When several alerts are raised the highest priority wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

pub const PRIORITY_TIMED_OUT: i32 = 1;
pub const PRIORITY_PARTIAL: i32 = 2;
pub const PRIORITY_EXCLUDED: i32 = 3;
pub const PRIORITY_MISSING_REVS: i32 = 4;
pub const PRIORITY_NO_REPOS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub priority: i32,
    pub title: String,
    pub description: String,
}

impl Alert {
    pub fn new(priority: i32, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            priority,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(
            PRIORITY_TIMED_OUT,
            "Timed out while searching",
            format!(
                "The search stopped after {}. Results found so far are shown; \
                 add a larger timeout: value to search longer.",
                humanize(after)
            ),
        )
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(
            PRIORITY_TIMED_OUT,
            "Timed out while searching",
            "The search deadline passed before all backends finished.",
        )
    }

    pub fn repos_timed_out(count: usize) -> Self {
        Self::new(
            PRIORITY_TIMED_OUT,
            "Timed out while searching",
            format!("{count} repositories timed out before any results were found."),
        )
    }

    pub fn optional_failed(err: &SearchError) -> Self {
        Self::new(
            PRIORITY_PARTIAL,
            "Some results may be missing",
            format!("An optional part of this search failed: {err}"),
        )
    }

    pub fn optional_cut_off(grace: Duration) -> Self {
        Self::new(
            PRIORITY_PARTIAL,
            "Some results may be missing",
            format!(
                "Slow optional searches were stopped {} after the main search finished.",
                humanize(grace)
            ),
        )
    }

    pub fn partial_or(failed: usize, total: usize, err: &SearchError) -> Self {
        Self::new(
            PRIORITY_PARTIAL,
            "Some results may be missing",
            format!("{failed} of {total} alternatives failed, the first with: {err}"),
        )
    }

    pub fn excluded(forks: usize, archived: usize) -> Self {
        let mut parts = Vec::new();
        if forks > 0 {
            parts.push(format!("{forks} forked (use fork:yes)"));
        }
        if archived > 0 {
            parts.push(format!("{archived} archived (use archived:yes)"));
        }
        Self::new(
            PRIORITY_EXCLUDED,
            "No results",
            format!(
                "No results, but some repositories were excluded: {}.",
                parts.join(" and ")
            ),
        )
    }

    pub fn missing_revisions(revs: &[String]) -> Self {
        Self::new(
            PRIORITY_MISSING_REVS,
            "Some revisions could not be found",
            format!("These revisions do not exist: {}.", revs.join(", ")),
        )
    }

    pub fn no_repositories() -> Self {
        Self::new(
            PRIORITY_NO_REPOS,
            "No repositories found",
            "No repositories matched the repository filters of this query.",
        )
    }
}

/// Keep the higher-priority alert. Ties keep the first.
pub fn max_alert(a: Option<Alert>, b: Option<Alert>) -> Option<Alert> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.priority > a.priority { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

fn humanize(d: Duration) -> String {
    if d.as_millis() < 1000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_alert_prefers_priority() {
        let low = Alert::timed_out(Duration::from_secs(10));
        let high = Alert::no_repositories();
        assert_eq!(
            max_alert(Some(low.clone()), Some(high.clone())),
            Some(high.clone())
        );
        assert_eq!(max_alert(Some(high.clone()), Some(low)), Some(high.clone()));
        assert_eq!(max_alert(None, Some(high.clone())), Some(high));
        assert_eq!(max_alert(None, None), None);
    }

    #[test]
    fn test_timed_out_description() {
        let a = Alert::timed_out(Duration::from_millis(250));
        assert!(a.description.contains("250ms"));
    }
}
