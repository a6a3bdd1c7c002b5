use std::time::Duration;

use quarry_backend::RepoFilter;

use super::field;
use super::node::{Node, OperatorKind, Parameter};
use super::{parse_duration, YesNoOnly};
use crate::error::CompileError;

/// A query whose parameters all sit at the top level, conjoined with a
/// single pattern expression that contains no parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basic {
    pub parameters: Vec<Parameter>,
    pub pattern: Option<Node>,
}

fn flatten_top_and(nodes: &[Node], out: &mut Vec<Node>) {
    for node in nodes {
        match node {
            Node::Operator {
                op: OperatorKind::And,
                operands,
            } if node.contains_parameter() => flatten_top_and(operands, out),
            other => out.push(other.clone()),
        }
    }
}

/// Split top-level nodes into parameters and one pattern expression.
pub fn to_basic_query(nodes: &[Node]) -> Result<Basic, CompileError> {
    let mut flat = Vec::new();
    flatten_top_and(nodes, &mut flat);

    let mut parameters = Vec::new();
    let mut patterns = Vec::new();
    for node in flat {
        match node {
            Node::Parameter(p) => parameters.push(p),
            other if other.contains_parameter() => {
                return Err(CompileError::NotBasic(other.to_string()));
            }
            other => patterns.push(other),
        }
    }

    let pattern = match patterns.len() {
        0 => None,
        1 => patterns.pop(),
        _ => Some(Node::and(patterns)),
    };
    Ok(Basic {
        parameters,
        pattern,
    })
}

impl Basic {
    pub fn new(parameters: Vec<Parameter>, pattern: Option<Node>) -> Self {
        Self {
            parameters,
            pattern,
        }
    }

    /// Same parameters with a different pattern.
    pub fn map_pattern(&self, pattern: Node) -> Basic {
        Basic {
            parameters: self.parameters.clone(),
            pattern: Some(pattern),
        }
    }

    pub fn to_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .parameters
            .iter()
            .cloned()
            .map(Node::Parameter)
            .collect();
        if let Some(p) = &self.pattern {
            nodes.push(p.clone());
        }
        nodes
    }

    /// The pattern as a single string. Concatenated patterns are joined
    /// with spaces; operators other than concatenation yield "".
    pub fn pattern_string(&self) -> String {
        match &self.pattern {
            Some(Node::Pattern(p)) => p.value.clone(),
            Some(Node::Operator {
                op: OperatorKind::Concat,
                operands,
            }) => operands
                .iter()
                .filter_map(|n| match n {
                    Node::Pattern(p) => Some(p.value.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }

    pub fn is_pattern_negated(&self) -> bool {
        matches!(&self.pattern, Some(Node::Pattern(p)) if p.negated)
    }

    pub fn exists(&self, field: &str) -> bool {
        self.parameters.iter().any(|p| p.field == field)
    }

    /// First non-negated value of `field`.
    pub fn string_value(&self, field: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.field == field && !p.negated)
            .map(|p| p.value.as_str())
    }

    /// Positive and negated values of `field`.
    pub fn string_values(&self, field: &str) -> (Vec<String>, Vec<String>) {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for p in self.parameters.iter().filter(|p| p.field == field) {
            if p.negated {
                negative.push(p.value.clone());
            } else {
                positive.push(p.value.clone());
            }
        }
        (positive, negative)
    }

    pub fn repositories(&self) -> (Vec<String>, Vec<String>) {
        self.string_values(field::REPO)
    }

    pub fn index(&self) -> Result<YesNoOnly, CompileError> {
        match self.string_value(field::INDEX) {
            Some(v) => YesNoOnly::parse(field::INDEX, v),
            None => Ok(YesNoOnly::Yes),
        }
    }

    pub fn fork(&self) -> Result<Option<YesNoOnly>, CompileError> {
        self.string_value(field::FORK)
            .map(|v| YesNoOnly::parse(field::FORK, v))
            .transpose()
    }

    pub fn archived(&self) -> Result<Option<YesNoOnly>, CompileError> {
        self.string_value(field::ARCHIVED)
            .map(|v| YesNoOnly::parse(field::ARCHIVED, v))
            .transpose()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.string_value(field::CASE)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "yes" | "true"))
    }

    pub fn timeout(&self) -> Result<Option<Duration>, CompileError> {
        self.string_value(field::TIMEOUT).map(parse_duration).transpose()
    }

    pub fn count(&self) -> Result<Option<usize>, CompileError> {
        self.string_value(field::COUNT)
            .map(|v| match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(CompileError::InvalidCount(v.to_string())),
            })
            .transpose()
    }

    /// True if any `repo:` filter asks for revisions by glob.
    pub fn contains_ref_globs(&self) -> bool {
        let (repos, _) = self.repositories();
        repos.iter().any(|r| RepoFilter::parse(r).has_rev_globs())
    }

    pub fn visit_parameters<'a>(&'a self, mut f: impl FnMut(&'a Parameter)) {
        for p in &self.parameters {
            f(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_basic_splits_parameters() {
        let nodes = vec![
            Node::parameter("repo", "acme"),
            Node::and(vec![
                Node::parameter("file", "\\.go$"),
                Node::concat(vec![Node::pattern("foo"), Node::pattern("bar")]),
            ]),
        ];
        let b = to_basic_query(&nodes).unwrap();
        assert_eq!(b.parameters.len(), 2);
        assert_eq!(b.pattern_string(), "foo bar");
        assert!(b.exists("file"));
    }

    #[test]
    fn test_parameter_under_or_is_not_basic() {
        let nodes = vec![Node::or(vec![
            Node::parameter("repo", "a"),
            Node::pattern("x"),
        ])];
        assert!(matches!(
            to_basic_query(&nodes),
            Err(CompileError::NotBasic(_))
        ));
    }

    #[test]
    fn test_multiple_patterns_are_conjoined() {
        let nodes = vec![Node::pattern("a"), Node::pattern("b")];
        let b = to_basic_query(&nodes).unwrap();
        assert!(matches!(
            b.pattern,
            Some(Node::Operator {
                op: OperatorKind::And,
                ..
            })
        ));
        assert_eq!(b.pattern_string(), "");
    }

    #[test]
    fn test_count_and_timeout() {
        let b = to_basic_query(&[
            Node::parameter("count", "100"),
            Node::parameter("timeout", "30s"),
        ])
        .unwrap();
        assert_eq!(b.count().unwrap(), Some(100));
        assert_eq!(b.timeout().unwrap(), Some(Duration::from_secs(30)));

        let bad = to_basic_query(&[Node::parameter("count", "lots")]).unwrap();
        assert!(bad.count().is_err());
    }

    #[test]
    fn test_ref_globs() {
        let b = to_basic_query(&[Node::parameter("repo", "acme@*refs/heads/*")]).unwrap();
        assert!(b.contains_ref_globs());
    }
}
