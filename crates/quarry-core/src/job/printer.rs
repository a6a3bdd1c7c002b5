//! S-expression rendering of job trees
//!
//! `(LIMIT (limit . 30) (PARALLEL (GLOBALTEXTSEARCH ...) ...))`. Output is
//! deterministic, so two compilations of the same query print identically.

use super::Job;

fn write_job(job: &dyn Job, depth: Option<usize>, out: &mut String) {
    out.push('(');
    out.push_str(&job.name().to_ascii_uppercase());
    for (key, value) in job.fields() {
        out.push_str(&format!(" ({key} . {value})"));
    }
    for child in job.children() {
        match depth {
            Some(d) => {
                out.push('\n');
                out.push_str(&"  ".repeat(d + 1));
                write_job(child.as_ref(), Some(d + 1), out);
            }
            None => {
                out.push(' ');
                write_job(child.as_ref(), None, out);
            }
        }
    }
    out.push(')');
}

/// Single-line rendering.
pub fn sexp(job: &dyn Job) -> String {
    let mut out = String::new();
    write_job(job, None, &mut out);
    out
}

/// Indented rendering, one job per line.
pub fn pretty(job: &dyn Job) -> String {
    let mut out = String::new();
    write_job(job, Some(0), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRef, Limit, Noop, Parallel};
    use std::sync::Arc;

    #[test]
    fn test_sexp_and_pretty() {
        let noop: JobRef = Arc::new(Noop);
        let job = Limit::new(30, Parallel::new(vec![noop.clone(), noop]));
        assert_eq!(sexp(job.as_ref()), "(LIMIT (limit . 30) (PARALLEL (NOOP) (NOOP)))");
        assert_eq!(
            pretty(job.as_ref()),
            "(LIMIT (limit . 30)\n  (PARALLEL\n    (NOOP)\n    (NOOP)))"
        );
    }
}
