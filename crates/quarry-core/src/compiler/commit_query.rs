//! Commit and diff query translation

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use quarry_backend::CommitQuery;

use crate::error::CompileError;
use crate::query::{field, Basic, Node, OperatorKind, SearchType};

/// Parse a `before:`/`after:` value: RFC 3339, `YYYY-MM-DD`, or a relative
/// `N days ago` style expression measured from `now`.
pub fn parse_commit_date(
    field_name: &str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, CompileError> {
    let invalid = || CompileError::InvalidValue {
        field: field_name.to_string(),
        value: value.to_string(),
    };
    let v = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(v) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(v, "%Y-%m-%d") {
        return d
            .and_hms_opt(0, 0, 0)
            .map(|t| Utc.from_utc_datetime(&t))
            .ok_or_else(invalid);
    }

    let words: Vec<&str> = v.split_whitespace().collect();
    match words.as_slice() {
        ["today"] => Ok(now),
        ["yesterday"] => Ok(now - Duration::days(1)),
        [n, unit, "ago"] => {
            let n: i64 = n.parse().map_err(|_| invalid())?;
            let days = match unit.trim_end_matches('s') {
                "hour" => return Ok(now - Duration::hours(n)),
                "day" => n,
                "week" => n * 7,
                "month" => n * 30,
                "year" => n * 365,
                _ => return Err(invalid()),
            };
            Ok(now - Duration::days(days))
        }
        _ => Err(invalid()),
    }
}

fn field_atoms(
    basic: &Basic,
    name: &str,
    ignore_case: bool,
    atom: fn(String, bool) -> CommitQuery,
) -> Vec<CommitQuery> {
    let (positive, negative) = basic.string_values(name);
    positive
        .into_iter()
        .map(|v| atom(v, ignore_case))
        .chain(
            negative
                .into_iter()
                .map(|v| CommitQuery::not(atom(v, ignore_case))),
        )
        .collect()
}

fn pattern_query(node: &Node, diff: bool, regexp: bool, ignore_case: bool) -> CommitQuery {
    let atom = |value: &str| {
        let expr = if regexp {
            value.to_string()
        } else {
            regex::escape(value)
        };
        if diff {
            CommitQuery::DiffMatches { expr, ignore_case }
        } else {
            CommitQuery::MessageMatches { expr, ignore_case }
        }
    };
    match node {
        Node::Pattern(p) if p.negated => CommitQuery::not(atom(&p.value)),
        Node::Pattern(p) => atom(&p.value),
        Node::Operator {
            op: OperatorKind::Concat,
            operands,
        } => {
            let joined: Vec<&str> = operands
                .iter()
                .filter_map(|n| match n {
                    Node::Pattern(p) => Some(p.value.as_str()),
                    _ => None,
                })
                .collect();
            atom(&joined.join(" "))
        }
        Node::Operator { op, operands } => {
            let children = operands
                .iter()
                .map(|n| pattern_query(n, diff, regexp, ignore_case))
                .collect();
            match op {
                OperatorKind::Or => CommitQuery::or(children),
                _ => CommitQuery::and(children),
            }
        }
        Node::Parameter(_) => CommitQuery::Boolean { value: true },
    }
}

/// Commit-search query of a basic query. The pattern matches diffs for diff
/// search and commit messages for commit search.
pub fn to_commit_query(
    basic: &Basic,
    diff: bool,
    search_type: SearchType,
    now: DateTime<Utc>,
) -> Result<CommitQuery, CompileError> {
    let ignore_case = !basic.is_case_sensitive();
    let mut parts = Vec::new();

    parts.extend(field_atoms(basic, field::AUTHOR, ignore_case, |expr, ignore_case| {
        CommitQuery::AuthorMatches { expr, ignore_case }
    }));
    parts.extend(field_atoms(basic, field::COMMITTER, ignore_case, |expr, ignore_case| {
        CommitQuery::CommitterMatches { expr, ignore_case }
    }));
    parts.extend(field_atoms(basic, field::MESSAGE, ignore_case, |expr, ignore_case| {
        CommitQuery::MessageMatches { expr, ignore_case }
    }));
    parts.extend(field_atoms(basic, field::FILE, ignore_case, |expr, ignore_case| {
        CommitQuery::DiffModifiesFile { expr, ignore_case }
    }));
    if let Some(before) = basic.string_value(field::BEFORE) {
        parts.push(CommitQuery::CommitBefore {
            time: parse_commit_date(field::BEFORE, before, now)?,
        });
    }
    if let Some(after) = basic.string_value(field::AFTER) {
        parts.push(CommitQuery::CommitAfter {
            time: parse_commit_date(field::AFTER, after, now)?,
        });
    }
    if let Some(pattern) = &basic.pattern {
        let regexp = search_type == SearchType::Regex;
        parts.push(pattern_query(pattern, diff, regexp, ignore_case));
    }
    Ok(CommitQuery::and(parts))
}
