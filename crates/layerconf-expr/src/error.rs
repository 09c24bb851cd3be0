// crates/layerconf-expr/src/error.rs
// ============================================================================
// Module: Expression Errors
// Description: Parse and evaluation failures for validator expressions.
// Purpose: Report structured, positioned diagnostics to rule authors.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every error carries the byte offset of the offending token when one is
//! known. Parse errors mean the rule itself is malformed; evaluation errors
//! mean the rule could not be applied to the bound values.

use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// Input was empty or contained only whitespace.
    #[error("expression is empty")]
    EmptyInput,
    /// Input exceeded the size limit.
    #[error("expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the nesting limit.
    #[error("expression nesting exceeds limit {max_depth} at {position}")]
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Input produced more syntax nodes than allowed.
    #[error("expression exceeds node limit {max_nodes}")]
    TooManyNodes {
        /// Maximum allowed node count.
        max_nodes: usize,
    },
    /// Unexpected token encountered during parsing.
    #[error("unexpected token `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The token that was actually seen.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// String literal was not closed before end of input.
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// String literal contained an unsupported escape sequence.
    #[error("invalid escape `\\{escape}` at {position}")]
    InvalidEscape {
        /// Escaped character.
        escape: char,
        /// Byte offset of the escape.
        position: usize,
    },
    /// Integer literal failed to parse or overflowed.
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber {
        /// Raw numeric text.
        raw: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Function name is not on the allow-list.
    #[error("unknown function `{name}` at {position}")]
    UnknownFunction {
        /// Unknown function identifier.
        name: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Function was called with the wrong number of arguments.
    #[error("function `{function}` expects {expected} argument(s), got {actual} at {position}")]
    WrongArity {
        /// Function name.
        function: &'static str,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        actual: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Unexpected trailing input after a complete expression.
    #[error("unexpected trailing input at {position}")]
    TrailingInput {
        /// Byte offset where unexpected input begins.
        position: usize,
    },
    /// Identifier has no binding.
    #[error("unknown identifier `{name}` at {position}")]
    UnknownIdentifier {
        /// Identifier name.
        name: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Operand types are not accepted by the operator or function.
    #[error("`{operator}` expects {expected}, found {found} at {position}")]
    TypeMismatch {
        /// Operator or function name.
        operator: &'static str,
        /// Expected operand description.
        expected: &'static str,
        /// Actual operand types.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Integer division or remainder by zero.
    #[error("division by zero at {position}")]
    DivisionByZero {
        /// Byte offset in the original input.
        position: usize,
    },
    /// Integer arithmetic overflowed.
    #[error("integer overflow at {position}")]
    Overflow {
        /// Byte offset in the original input.
        position: usize,
    },
    /// Expression evaluated to a non-boolean value.
    #[error("expression result is not a boolean: {found}")]
    NotBoolean {
        /// Type name of the actual result.
        found: &'static str,
    },
}

impl ExprError {
    /// Returns true when the error was raised while parsing the expression
    /// text rather than while evaluating it.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput
                | Self::InputTooLarge { .. }
                | Self::NestingTooDeep { .. }
                | Self::TooManyNodes { .. }
                | Self::UnexpectedToken { .. }
                | Self::UnterminatedString { .. }
                | Self::InvalidEscape { .. }
                | Self::InvalidNumber { .. }
                | Self::UnknownFunction { .. }
                | Self::WrongArity { .. }
                | Self::TrailingInput { .. }
        )
    }
}
