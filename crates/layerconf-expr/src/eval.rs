// crates/layerconf-expr/src/eval.rs
// ============================================================================
// Module: Expression Evaluation
// Description: Tree-walking evaluator for parsed validator expressions.
// Purpose: Apply validation rules to typed configuration values.
// Dependencies: crate::ast, crate::parser, crate::value, crate::error
// ============================================================================

//! ## Overview
//! Evaluation is strict about types: operators never coerce between integers,
//! strings and booleans. Integer arithmetic is checked, so overflow and
//! division by zero surface as errors instead of wrapping or panicking.
//! `&&` and `||` short-circuit.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::ast::BinaryOp;
use crate::ast::Function;
use crate::ast::Node;
use crate::ast::UnaryOp;
use crate::error::ExprError;
use crate::parser::parse;
use crate::value::Bindings;
use crate::value::Value;

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Parsed expression ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Original source text.
    source: String,
    /// Parsed syntax tree.
    root: Node,
}

impl Expression {
    /// Parses expression source text.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError`] when the text is malformed or exceeds limits.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let root = parse(source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Returns the original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression against the bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError`] when an identifier is unbound, operand types do
    /// not match, or integer arithmetic fails.
    pub fn evaluate<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<Value, ExprError> {
        eval(&self.root, bindings)
    }

    /// Evaluates the expression and requires a boolean result.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::NotBoolean`] when the result is not a boolean, or
    /// any error from [`Expression::evaluate`].
    pub fn evaluate_bool<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<bool, ExprError> {
        match self.evaluate(bindings)? {
            Value::Bool(result) => Ok(result),
            other => Err(ExprError::NotBoolean {
                found: other.type_name(),
            }),
        }
    }
}

impl FromStr for Expression {
    type Err = ExprError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses and evaluates an expression in one step.
///
/// # Errors
///
/// Returns [`ExprError`] for parse or evaluation failures.
pub fn evaluate<B: Bindings + ?Sized>(source: &str, bindings: &B) -> Result<Value, ExprError> {
    Expression::parse(source)?.evaluate(bindings)
}

/// Parses and evaluates an expression that must yield a boolean.
///
/// # Errors
///
/// Returns [`ExprError`] for parse or evaluation failures, including
/// [`ExprError::NotBoolean`].
pub fn evaluate_bool<B: Bindings + ?Sized>(source: &str, bindings: &B) -> Result<bool, ExprError> {
    Expression::parse(source)?.evaluate_bool(bindings)
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Evaluates a node recursively.
fn eval<B: Bindings + ?Sized>(node: &Node, bindings: &B) -> Result<Value, ExprError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Ident {
            name,
            position,
        } => bindings.lookup(name).ok_or_else(|| ExprError::UnknownIdentifier {
            name: name.clone(),
            position: *position,
        }),
        Node::Unary {
            op,
            operand,
            position,
        } => eval_unary(*op, eval(operand, bindings)?, *position),
        Node::Binary {
            op: BinaryOp::And,
            left,
            right,
            position,
        } => {
            if !expect_bool(eval(left, bindings)?, "&&", *position)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(eval(right, bindings)?, "&&", *position)?))
        }
        Node::Binary {
            op: BinaryOp::Or,
            left,
            right,
            position,
        } => {
            if expect_bool(eval(left, bindings)?, "||", *position)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(eval(right, bindings)?, "||", *position)?))
        }
        Node::Binary {
            op,
            left,
            right,
            position,
        } => eval_binary(*op, eval(left, bindings)?, eval(right, bindings)?, *position),
        Node::Call {
            function,
            args,
            position,
        } => {
            let values =
                args.iter().map(|arg| eval(arg, bindings)).collect::<Result<Vec<_>, _>>()?;
            call(*function, values, *position)
        }
    }
}

/// Applies a unary operator.
fn eval_unary(op: UnaryOp, operand: Value, position: usize) -> Result<Value, ExprError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
        (UnaryOp::Negate, Value::Int(value)) => value
            .checked_neg()
            .map(Value::Int)
            .ok_or(ExprError::Overflow {
                position,
            }),
        (UnaryOp::Not, other) => Err(mismatch("!", "a boolean", other.type_name(), position)),
        (UnaryOp::Negate, other) => Err(mismatch("-", "an integer", other.type_name(), position)),
    }
}

/// Applies a non-short-circuit binary operator.
fn eval_binary(
    op: BinaryOp,
    left: Value,
    right: Value,
    position: usize,
) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            if left.type_name() != right.type_name() {
                return Err(pair_mismatch(op, "operands of the same type", &left, &right, position));
            }
            Ok(Value::Bool((left == right) == (op == BinaryOp::Eq)))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => {
                    return Err(pair_mismatch(
                        op,
                        "two integers or two strings",
                        &left,
                        &right,
                        position,
                    ));
                }
            };
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => checked(a.checked_add(b), position),
            (Value::Str(mut a), Value::Str(b)) => {
                a.push_str(&b);
                Ok(Value::Str(a))
            }
            (left, right) => {
                Err(pair_mismatch(op, "two integers or two strings", &left, &right, position))
            }
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
                return Err(pair_mismatch(op, "two integers", &left, &right, position));
            };
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Sub => checked(a.checked_sub(b), position),
                BinaryOp::Mul => checked(a.checked_mul(b), position),
                _ if b == 0 => Err(ExprError::DivisionByZero {
                    position,
                }),
                BinaryOp::Div => checked(a.checked_div(b), position),
                _ => checked(a.checked_rem(b), position),
            }
        }
        BinaryOp::And | BinaryOp::Or => {
            let symbol = op.symbol();
            let left = expect_bool(left, symbol, position)?;
            let right = expect_bool(right, symbol, position)?;
            Ok(Value::Bool(if op == BinaryOp::And { left && right } else { left || right }))
        }
    }
}

/// Invokes an allow-listed function on evaluated arguments.
fn call(function: Function, args: Vec<Value>, position: usize) -> Result<Value, ExprError> {
    let name = function.name();
    let mut args = args.into_iter();
    let first = args.next();
    let second = args.next();
    match (function, first, second) {
        (Function::Len, Some(Value::Str(text)), None) => {
            let count = i64::try_from(text.chars().count()).map_err(|_| ExprError::Overflow {
                position,
            })?;
            Ok(Value::Int(count))
        }
        (Function::Lower, Some(Value::Str(text)), None) => Ok(Value::Str(text.to_lowercase())),
        (Function::Upper, Some(Value::Str(text)), None) => Ok(Value::Str(text.to_uppercase())),
        (Function::Contains, Some(Value::Str(text)), Some(Value::Str(needle))) => {
            Ok(Value::Bool(text.contains(needle.as_str())))
        }
        (Function::StartsWith, Some(Value::Str(text)), Some(Value::Str(prefix))) => {
            Ok(Value::Bool(text.starts_with(prefix.as_str())))
        }
        (Function::EndsWith, Some(Value::Str(text)), Some(Value::Str(suffix))) => {
            Ok(Value::Bool(text.ends_with(suffix.as_str())))
        }
        (Function::Abs, Some(Value::Int(value)), None) => checked(value.checked_abs(), position),
        (Function::Min, Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(a.min(b))),
        (Function::Max, Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(a.max(b))),
        (Function::Len | Function::Lower | Function::Upper, first, _) => {
            Err(mismatch(name, "a string", describe(first.as_ref()), position))
        }
        (Function::Contains | Function::StartsWith | Function::EndsWith, first, second) => {
            Err(ExprError::TypeMismatch {
                operator: name,
                expected: "two strings",
                found: format!("{}, {}", describe(first.as_ref()), describe(second.as_ref())),
                position,
            })
        }
        (Function::Abs, first, _) => {
            Err(mismatch(name, "an integer", describe(first.as_ref()), position))
        }
        (Function::Min | Function::Max, first, second) => Err(ExprError::TypeMismatch {
            operator: name,
            expected: "two integers",
            found: format!("{}, {}", describe(first.as_ref()), describe(second.as_ref())),
            position,
        }),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Requires a boolean operand.
fn expect_bool(value: Value, operator: &'static str, position: usize) -> Result<bool, ExprError> {
    match value {
        Value::Bool(value) => Ok(value),
        other => Err(mismatch(operator, "booleans", other.type_name(), position)),
    }
}

/// Wraps a checked integer result.
const fn checked(result: Option<i64>, position: usize) -> Result<Value, ExprError> {
    match result {
        Some(value) => Ok(Value::Int(value)),
        None => Err(ExprError::Overflow {
            position,
        }),
    }
}

/// Describes an optional argument type.
fn describe(value: Option<&Value>) -> &'static str {
    value.map_or("nothing", Value::type_name)
}

/// Builds a single-operand type mismatch error.
fn mismatch(
    operator: &'static str,
    expected: &'static str,
    found: &str,
    position: usize,
) -> ExprError {
    ExprError::TypeMismatch {
        operator,
        expected,
        found: found.to_string(),
        position,
    }
}

/// Builds a two-operand type mismatch error.
fn pair_mismatch(
    op: BinaryOp,
    expected: &'static str,
    left: &Value,
    right: &Value,
    position: usize,
) -> ExprError {
    ExprError::TypeMismatch {
        operator: op.symbol(),
        expected,
        found: format!("{}, {}", left.type_name(), right.type_name()),
        position,
    }
}
