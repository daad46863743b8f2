use thiserror::Error;

use crate::models::expression::ExprId;
use crate::models::properties::PropertyKey;
use crate::services::proof_tree::NodeId;

/// Errors raised while generating, computing or ordering a proof tree.
///
/// None of these are recovered locally: the operation that triggered one
/// is aborted and the partially built state is discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// A parametrization or identity invariant does not hold.
    #[error("constraint violation{}: {reason}", context(.node, .rule, .parametrization))]
    ConstraintViolation {
        node: Option<NodeId>,
        rule: Option<&'static str>,
        parametrization: Option<String>,
        reason: String,
    },

    /// A node should have been expanded but no rule applies to it.
    #[error("unsatisfiable branch at node {node}: no rule can derive {form}")]
    UnsatisfiableBranch { node: NodeId, form: String },

    /// The temporal annotations of a tree contain a cycle.
    #[error("cyclic time constraint between nodes {nodes:?}")]
    CyclicTimeConstraint { nodes: Vec<NodeId> },

    /// A sampler was asked for an order over an inconsistent node subset.
    #[error("invalid order request: {reason}")]
    InvalidOrderRequest { reason: String },
}

impl GenerationError {
    pub fn violation(reason: impl Into<String>) -> Self {
        GenerationError::ConstraintViolation {
            node: None,
            rule: None,
            parametrization: None,
            reason: reason.into(),
        }
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        GenerationError::InvalidOrderRequest { reason: reason.into() }
    }

    /// Attach the node, rule and parametrization a violation happened at.
    /// Fields that are already set are kept.
    pub fn at(self, at_node: NodeId, at_rule: &'static str, at_param: Option<String>) -> Self {
        match self {
            GenerationError::ConstraintViolation { node, rule, parametrization, reason } => {
                GenerationError::ConstraintViolation {
                    node: node.or(Some(at_node)),
                    rule: rule.or(Some(at_rule)),
                    parametrization: parametrization.or(at_param),
                    reason,
                }
            }
            other => other,
        }
    }
}

fn context(
    node: &Option<NodeId>,
    rule: &Option<&'static str>,
    parametrization: &Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(node) = node {
        parts.push(format!("node {}", node));
    }
    if let Some(rule) = rule {
        parts.push(format!("rule {}", rule));
    }
    if let Some(param) = parametrization {
        parts.push(format!("parametrization {}", param));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Errors raised while evaluating a symbolic quantity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("no value bound for placeholder {0}")]
    UnboundPlaceholder(PropertyKey),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression handle {0} does not belong to this arena")]
    UnknownExpr(ExprId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_context_is_rendered() {
        let err = GenerationError::violation("sides do not match")
            .at(NodeId(3), "ContCompCont", Some("Comparison".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("node 3"));
        assert!(msg.contains("rule ContCompCont"));
        assert!(msg.contains("sides do not match"));
    }

    #[test]
    fn test_at_keeps_existing_context() {
        let err = GenerationError::violation("bad")
            .at(NodeId(1), "A", None)
            .at(NodeId(2), "B", None);
        match err {
            GenerationError::ConstraintViolation { node, rule, .. } => {
                assert_eq!(node, Some(NodeId(1)));
                assert_eq!(rule, Some("A"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_at_leaves_other_variants_untouched() {
        let err = GenerationError::invalid_order("empty").at(NodeId(0), "X", None);
        assert!(matches!(err, GenerationError::InvalidOrderRequest { .. }));
    }
}
