//! Shape of compiled job trees.

use quarry_core::{compile, pretty, sexp, Args, JobRef, Node, Protocol, SearchInputs};

fn names(job: &JobRef) -> Vec<&'static str> {
    let mut out = vec![job.name()];
    for child in job.children() {
        out.extend(names(&child));
    }
    out
}

#[test]
fn test_printed_tree_is_stable() {
    let nodes = vec![
        Node::parameter("repo", "^github\\.com/acme/"),
        Node::parameter("type", "symbol"),
        Node::parameter("type", "commit"),
        Node::pattern("handler"),
    ];
    let a = sexp(compile(&nodes, &Args::default()).unwrap().as_ref());
    let b = sexp(compile(&nodes, &Args::default()).unwrap().as_ref());
    assert_eq!(a, b);

    let job = compile(&nodes, &Args::default()).unwrap();
    let printed = pretty(job.as_ref());
    assert!(printed.starts_with("(ALERT"));
    assert!(printed.contains("(TIMEOUT (timeout . 20s)"));
    assert!(printed.contains("(LIMIT (limit . 30)"));
}

#[test]
fn test_parameters_under_or_expand_into_alternatives() {
    let nodes = vec![Node::or(vec![
        Node::and(vec![Node::parameter("repo", "api"), Node::pattern("foo")]),
        Node::and(vec![Node::parameter("repo", "web"), Node::pattern("bar")]),
    ])];
    let job = compile(&nodes, &Args::default()).unwrap();
    assert_eq!(job.name(), "Alert");

    let or = &job.children()[0];
    assert_eq!(or.name(), "Or");
    let alternatives = or.children();
    assert_eq!(alternatives.len(), 2);
    assert!(alternatives.iter().all(|j| j.name() == "Timeout"));
}

#[test]
fn test_pure_pattern_or_stays_one_alternative() {
    let nodes = vec![Node::or(vec![Node::pattern("foo"), Node::pattern("bar")])];
    let job = compile(&nodes, &Args::default()).unwrap();
    // Alert -> Timeout -> Limit -> Or of two searches
    let timeout = &job.children()[0];
    assert_eq!(timeout.name(), "Timeout");
    let or = &timeout.children()[0].children()[0];
    assert_eq!(or.name(), "Or");
    assert_eq!(or.children().len(), 2);
}

#[test]
fn test_universe_search_depends_on_scope() {
    let global = compile(&[Node::pattern("foo")], &Args::default()).unwrap();
    assert!(names(&global).contains(&"GlobalTextSearch"));

    let scoped = compile(
        &[Node::parameter("repo", "acme"), Node::pattern("foo")],
        &Args::default(),
    )
    .unwrap();
    let scoped = names(&scoped);
    assert!(!scoped.contains(&"GlobalTextSearch"));
    assert!(scoped.contains(&"IndexedSubsetTextSearch"));

    let negated_repo = compile(
        &[Node::negated_parameter("repo", "acme"), Node::pattern("foo")],
        &Args::default(),
    )
    .unwrap();
    assert!(names(&negated_repo).contains(&"GlobalTextSearch"));
}

#[test]
fn test_streaming_limit_and_timeout() {
    let args = Args {
        inputs: SearchInputs {
            protocol: Protocol::Streaming,
            ..Default::default()
        },
        ..Default::default()
    };
    let job = compile(&[Node::pattern("foo")], &args).unwrap();
    assert!(sexp(job.as_ref()).contains("(LIMIT (limit . 500)"));
}
