// crates/layerconf-expr/src/ast.rs
// ============================================================================
// Module: Expression Syntax Tree
// Description: Parsed representation of validator expressions.
// Purpose: Decouple parsing from evaluation.
// Dependencies: crate::value
// ============================================================================

//! ## Overview
//! Nodes keep the byte offset of the token that introduced them so
//! evaluation errors can point back into the source text.

use crate::value::Value;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    /// Logical negation.
    Not,
    /// Integer negation.
    Negate,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    /// Short-circuit logical AND.
    And,
    /// Short-circuit logical OR.
    Or,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Addition or string concatenation.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
}

impl BinaryOp {
    /// Returns the operator symbol used in diagnostics.
    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Allow-listed pure functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `len(s)`: character count of a string.
    Len,
    /// `contains(s, needle)`.
    Contains,
    /// `starts_with(s, prefix)`.
    StartsWith,
    /// `ends_with(s, suffix)`.
    EndsWith,
    /// `lower(s)`.
    Lower,
    /// `upper(s)`.
    Upper,
    /// `abs(n)`.
    Abs,
    /// `min(a, b)`.
    Min,
    /// `max(a, b)`.
    Max,
}

impl Function {
    /// Resolves an identifier to an allow-listed function.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Self::Len),
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "abs" => Some(Self::Abs),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Returns the function name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Returns the number of arguments the function accepts.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Len | Self::Lower | Self::Upper | Self::Abs => 1,
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::Min | Self::Max => 2,
        }
    }
}

/// Expression syntax tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// Literal value.
    Literal(Value),
    /// Identifier resolved at evaluation time.
    Ident {
        /// Identifier name.
        name: String,
        /// Byte offset in the source.
        position: usize,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Self>,
        /// Byte offset in the source.
        position: usize,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Self>,
        /// Right operand.
        right: Box<Self>,
        /// Byte offset of the operator.
        position: usize,
    },
    /// Function call.
    Call {
        /// Called function.
        function: Function,
        /// Arguments, already checked against the arity.
        args: Vec<Self>,
        /// Byte offset of the function name.
        position: usize,
    },
}
