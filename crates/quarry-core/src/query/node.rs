//! Parsed query tree
//!
//! Parsing happens upstream; the engine receives this tree (usually as
//! JSON) and never looks at query syntax.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub value: String,
    #[serde(default)]
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    And,
    Or,
    /// Adjacent patterns with no explicit operator between them
    Concat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Pattern(Pattern),
    Parameter(Parameter),
    Operator {
        op: OperatorKind,
        #[serde(default)]
        operands: Vec<Node>,
    },
}

impl Node {
    pub fn pattern(value: impl Into<String>) -> Node {
        Node::Pattern(Pattern {
            value: value.into(),
            negated: false,
        })
    }

    pub fn negated_pattern(value: impl Into<String>) -> Node {
        Node::Pattern(Pattern {
            value: value.into(),
            negated: true,
        })
    }

    pub fn parameter(field: impl Into<String>, value: impl Into<String>) -> Node {
        Node::Parameter(Parameter {
            field: field.into(),
            value: value.into(),
            negated: false,
        })
    }

    pub fn negated_parameter(field: impl Into<String>, value: impl Into<String>) -> Node {
        Node::Parameter(Parameter {
            field: field.into(),
            value: value.into(),
            negated: true,
        })
    }

    pub fn and(operands: Vec<Node>) -> Node {
        Node::Operator {
            op: OperatorKind::And,
            operands,
        }
    }

    pub fn or(operands: Vec<Node>) -> Node {
        Node::Operator {
            op: OperatorKind::Or,
            operands,
        }
    }

    pub fn concat(operands: Vec<Node>) -> Node {
        Node::Operator {
            op: OperatorKind::Concat,
            operands,
        }
    }

    /// True if any node in this subtree is a parameter.
    pub fn contains_parameter(&self) -> bool {
        match self {
            Node::Parameter(_) => true,
            Node::Pattern(_) => false,
            Node::Operator { operands, .. } => operands.iter().any(Node::contains_parameter),
        }
    }

    /// Visit every parameter in this subtree.
    pub fn visit_parameters<'a>(&'a self, f: &mut dyn FnMut(&'a Parameter)) {
        match self {
            Node::Parameter(p) => f(p),
            Node::Pattern(_) => {}
            Node::Operator { operands, .. } => {
                for operand in operands {
                    operand.visit_parameters(f);
                }
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Pattern(p) => {
                if p.negated {
                    write!(f, "(not {:?})", p.value)
                } else {
                    write!(f, "{:?}", p.value)
                }
            }
            Node::Parameter(p) => {
                let neg = if p.negated { "-" } else { "" };
                write!(f, "{neg}{}:{}", p.field, p.value)
            }
            Node::Operator { op, operands } => {
                let name = match op {
                    OperatorKind::And => "and",
                    OperatorKind::Or => "or",
                    OperatorKind::Concat => "concat",
                };
                write!(f, "({name}")?;
                for operand in operands {
                    write!(f, " {operand}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Render a list of top-level nodes, which are implicitly conjoined.
pub fn nodes_to_string(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(Node::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
