// crates/layerconf-expr/src/lib.rs
// ============================================================================
// Module: Layerconf Expression Library
// Description: Sandboxed boolean expression language for value validators.
// Purpose: Evaluate configuration key validation rules without a host runtime.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `layerconf-expr` parses and evaluates the small expression language used
//! by configuration key validators. Expressions operate on integers, strings
//! and booleans, resolve identifiers through caller-provided [`Bindings`], and
//! may only call a fixed allow-list of pure functions. There is no I/O, no
//! looping construct and no user-defined function, so evaluation always
//! terminates in time proportional to the expression size.
//!
//! ### Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use layerconf_expr::Value;
//! use layerconf_expr::evaluate_bool;
//!
//! let mut bindings = BTreeMap::new();
//! bindings.insert("it".to_string(), Value::Str("red".to_string()));
//!
//! assert_eq!(evaluate_bool("len(it) > 2", &bindings), Ok(true));
//! ```
//!
//! Security posture: validator expressions are stored data and therefore
//! untrusted; the evaluator enforces input size, nesting and node limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod ast;
pub mod error;
pub mod eval;
mod lexer;
mod parser;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ast::Function;
pub use error::ExprError;
pub use eval::Expression;
pub use eval::evaluate;
pub use eval::evaluate_bool;
pub use parser::MAX_EXPR_INPUT_BYTES;
pub use parser::MAX_EXPR_NESTING;
pub use parser::MAX_EXPR_NODES;
pub use value::Bindings;
pub use value::Value;
