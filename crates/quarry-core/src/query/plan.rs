//! Expansion of a query into a plan of basic queries
//!
//! Parameters may appear under an OR, as in `(repo:a foo) or (repo:b bar)`.
//! Such a query is not basic, so it is rewritten into disjunctive normal
//! form over the parameter-bearing ORs and each disjunct becomes its own
//! basic query.

use super::basic::{to_basic_query, Basic};
use super::node::{Node, OperatorKind};
use crate::error::CompileError;

pub type Plan = Vec<Basic>;

const MAX_PLAN_SIZE: usize = 64;

fn dnf(node: &Node) -> Vec<Vec<Node>> {
    match node {
        Node::Operator {
            op: OperatorKind::Or,
            operands,
        } if node.contains_parameter() => operands.iter().flat_map(dnf).collect(),
        Node::Operator {
            op: OperatorKind::And,
            operands,
        } if node.contains_parameter() => conjoin(operands),
        other => vec![vec![other.clone()]],
    }
}

fn conjoin(nodes: &[Node]) -> Vec<Vec<Node>> {
    let mut acc: Vec<Vec<Node>> = vec![Vec::new()];
    for node in nodes {
        let alternatives = dnf(node);
        let mut next = Vec::with_capacity(acc.len() * alternatives.len());
        for prefix in &acc {
            for alt in &alternatives {
                let mut combined = prefix.clone();
                combined.extend(alt.iter().cloned());
                next.push(combined);
            }
        }
        acc = next;
    }
    acc
}

/// Expand top-level nodes into one basic query per disjunct.
pub fn expand_plan(nodes: &[Node]) -> Result<Plan, CompileError> {
    let disjuncts = conjoin(nodes);
    if disjuncts.len() > MAX_PLAN_SIZE {
        return Err(CompileError::NotBasic(format!(
            "query expands to {} alternatives, more than {MAX_PLAN_SIZE}",
            disjuncts.len()
        )));
    }
    disjuncts.iter().map(|d| to_basic_query(d)).collect()
}
