//! Trigger expressions
//!
//! A trigger expression is a single comparison of the form
//! `<path><operator><value>`, e.g. `sensors.temp>200`. The path is handed to
//! the controller for evaluation; the comparison against the value happens
//! here, on the controller's textual result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expression errors
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("invalid expression '{0}': expected <path><operator><value>")]
    MissingOperator(String),

    #[error("invalid expression '{0}': empty state path")]
    EmptyPath(String),

    #[error("non-numeric operand '{operand}' under ordering operator '{op}'")]
    NonNumericOperand { op: ComparisonOp, operand: String },
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// The closed set of comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl ComparisonOp {
    /// Operator token as written in an expression
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Le => "<=",
        }
    }

    /// Ordering operators compare numerically; equality operators compare
    /// the textual forms
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOp::Gt | ComparisonOp::Lt | ComparisonOp::Ge | ComparisonOp::Le
        )
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decomposed trigger expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerExpression {
    /// Object-model path evaluated by the controller
    pub path: String,

    /// Comparison operator
    pub op: ComparisonOp,

    /// Literal the result is compared against
    pub value: String,
}

impl TriggerExpression {
    /// Decompose `<path><operator><value>` at the first operator occurrence
    ///
    /// Two-character operators win over their one-character prefixes, so
    /// `temp>=5` parses as `Ge`, not `Gt` followed by `=5`. The value may be
    /// empty; under an ordering operator that surfaces later as a
    /// non-numeric-operand error.
    pub fn parse(input: &str) -> ExpressionResult<Self> {
        let bytes = input.as_bytes();
        for (i, window) in bytes.windows(2).enumerate() {
            let op = match window {
                b"==" => Some((ComparisonOp::Eq, 2)),
                b"!=" => Some((ComparisonOp::Ne, 2)),
                b">=" => Some((ComparisonOp::Ge, 2)),
                b"<=" => Some((ComparisonOp::Le, 2)),
                [b'>', _] => Some((ComparisonOp::Gt, 1)),
                [b'<', _] => Some((ComparisonOp::Lt, 1)),
                _ => None,
            };
            if let Some((op, len)) = op {
                return Self::from_parts(input, &input[..i], op, &input[i + len..]);
            }
        }
        // A trailing one-character operator is still an operator
        match bytes.last() {
            Some(b'>') => Self::from_parts(input, &input[..bytes.len() - 1], ComparisonOp::Gt, ""),
            Some(b'<') => Self::from_parts(input, &input[..bytes.len() - 1], ComparisonOp::Lt, ""),
            _ => Err(ExpressionError::MissingOperator(input.to_string())),
        }
    }

    fn from_parts(
        input: &str,
        path: &str,
        op: ComparisonOp,
        value: &str,
    ) -> ExpressionResult<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ExpressionError::EmptyPath(input.to_string()));
        }
        Ok(Self {
            path: path.to_string(),
            op,
            value: value.trim().to_string(),
        })
    }

    /// Compare the controller's evaluation result against the stored value
    ///
    /// Equality operators compare strings; ordering operators parse both
    /// sides as numbers and fail hard when either side is not numeric.
    ///
    /// Both sides are whitespace-trimmed before comparison, matching how
    /// the parser trims the stored literal. A result of `" idle "` equals
    /// the literal `idle`; whitespace inside a literal is never
    /// significant at the edges.
    pub fn condition_met(&self, result: &str) -> ExpressionResult<bool> {
        let result = result.trim();
        if self.op.is_ordering() {
            let lhs = parse_number(result, self.op)?;
            let rhs = parse_number(&self.value, self.op)?;
            Ok(match self.op {
                ComparisonOp::Gt => lhs > rhs,
                ComparisonOp::Lt => lhs < rhs,
                ComparisonOp::Ge => lhs >= rhs,
                ComparisonOp::Le => lhs <= rhs,
                _ => unreachable!(),
            })
        } else {
            Ok(match self.op {
                ComparisonOp::Eq => result == self.value,
                ComparisonOp::Ne => result != self.value,
                _ => unreachable!(),
            })
        }
    }
}

impl std::fmt::Display for TriggerExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.path, self.op, self.value)
    }
}

fn parse_number(operand: &str, op: ComparisonOp) -> ExpressionResult<f64> {
    operand
        .trim()
        .parse::<f64>()
        .map_err(|_| ExpressionError::NonNumericOperand {
            op,
            operand: operand.to_string(),
        })
}
