// crates/layerconf-expr/src/parser.rs
// ============================================================================
// Module: Expression Parser
// Description: Recursive-descent parser for validator expressions.
// Purpose: Build a syntax tree while enforcing resource limits.
// Dependencies: crate::ast, crate::lexer, crate::error
// ============================================================================

//! ## Overview
//! Precedence, lowest first: `||`, `&&`, equality, ordering, additive,
//! multiplicative, unary. All binary operators are left-associative.
//! Function names are resolved against the allow-list at parse time so a
//! rule that calls an unknown function is rejected before it is stored.

use crate::ast::BinaryOp;
use crate::ast::Function;
use crate::ast::Node;
use crate::ast::UnaryOp;
use crate::error::ExprError;
use crate::lexer::Lexer;
use crate::lexer::SpannedToken;
use crate::lexer::Token;
use crate::value::Value;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum allowed expression size in bytes.
pub const MAX_EXPR_INPUT_BYTES: usize = 64 * 1024;
/// Maximum nesting depth for parentheses, calls and unary chains.
pub const MAX_EXPR_NESTING: usize = 32;
/// Maximum number of syntax nodes in one expression.
pub const MAX_EXPR_NODES: usize = 1024;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses expression source text into a syntax tree.
pub(crate) fn parse(input: &str) -> Result<Node, ExprError> {
    if input.len() > MAX_EXPR_INPUT_BYTES {
        return Err(ExprError::InputTooLarge {
            max_bytes: MAX_EXPR_INPUT_BYTES,
            actual_bytes: input.len(),
        });
    }
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser::new(tokens);
    let root = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(root)
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser state.
struct Parser<'input> {
    /// Token stream with source positions.
    tokens: Vec<SpannedToken<'input>>,
    /// Current token index.
    index: usize,
    /// Current nesting depth.
    nesting: usize,
    /// Number of nodes built so far.
    nodes: usize,
}

impl<'input> Parser<'input> {
    /// Creates a parser over the token stream.
    const fn new(tokens: Vec<SpannedToken<'input>>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
            nodes: 0,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> Result<Node, ExprError> {
        self.parse_or()
    }

    /// Parses OR chains.
    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_and()?;
        while let Some(position) = self.matches(&Token::Or) {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right, position)?;
        }
        Ok(left)
    }

    /// Parses AND chains.
    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_equality()?;
        while let Some(position) = self.matches(&Token::And) {
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::And, left, right, position)?;
        }
        Ok(left)
    }

    /// Parses `==` and `!=` chains.
    fn parse_equality(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current().token {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                _ => return Ok(left),
            };
            let position = self.advance();
            let right = self.parse_comparison()?;
            left = self.binary(op, left, right, position)?;
        }
    }

    /// Parses ordering comparisons.
    fn parse_comparison(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().token {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            let position = self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right, position)?;
        }
    }

    /// Parses `+` and `-` chains.
    fn parse_additive(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let position = self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right, position)?;
        }
    }

    /// Parses `*`, `/` and `%` chains.
    fn parse_multiplicative(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let position = self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right, position)?;
        }
    }

    /// Parses unary expressions.
    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        let op = match self.current().token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            _ => return self.parse_primary(),
        };
        let position = self.advance();
        self.with_nesting(position, |parser| {
            let operand = parser.parse_unary()?;
            parser.node(Node::Unary {
                op,
                operand: Box::new(operand),
                position,
            })
        })
    }

    /// Parses literals, identifiers, calls and parenthesized expressions.
    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let SpannedToken {
            token,
            position,
        } = self.current().clone();
        match token {
            Token::Int(raw) => {
                self.advance();
                let value: i64 = raw.parse().map_err(|_| ExprError::InvalidNumber {
                    raw: raw.to_string(),
                    position,
                })?;
                self.node(Node::Literal(Value::Int(value)))
            }
            Token::Str(value) => {
                self.advance();
                self.node(Node::Literal(Value::Str(value)))
            }
            Token::True => {
                self.advance();
                self.node(Node::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.advance();
                self.node(Node::Literal(Value::Bool(false)))
            }
            Token::Ident(name) => {
                self.advance();
                if self.matches(&Token::LParen).is_some() {
                    self.parse_call(name, position)
                } else {
                    self.node(Node::Ident {
                        name: name.to_string(),
                        position,
                    })
                }
            }
            Token::LParen => {
                self.advance();
                self.with_nesting(position, |parser| {
                    let expr = parser.parse_expression()?;
                    parser.expect(&Token::RParen, "`)`")?;
                    Ok(expr)
                })
            }
            _ => Err(ExprError::UnexpectedToken {
                expected: "literal, identifier, or `(`",
                found: token.describe(),
                position,
            }),
        }
    }

    /// Parses the argument list of an allow-listed function.
    fn parse_call(&mut self, name: &str, position: usize) -> Result<Node, ExprError> {
        let function = Function::from_name(name).ok_or_else(|| ExprError::UnknownFunction {
            name: name.to_string(),
            position,
        })?;
        self.with_nesting(position, |parser| {
            let mut args = Vec::new();
            if parser.matches(&Token::RParen).is_none() {
                loop {
                    args.push(parser.parse_expression()?);
                    if parser.matches(&Token::Comma).is_some() {
                        continue;
                    }
                    parser.expect(&Token::RParen, "`)` after arguments")?;
                    break;
                }
            }
            if args.len() != function.arity() {
                return Err(ExprError::WrongArity {
                    function: function.name(),
                    expected: function.arity(),
                    actual: args.len(),
                    position,
                });
            }
            parser.node(Node::Call {
                function,
                args,
                position,
            })
        })
    }

    /// Builds a binary node.
    fn binary(
        &mut self,
        op: BinaryOp,
        left: Node,
        right: Node,
        position: usize,
    ) -> Result<Node, ExprError> {
        self.node(Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            position,
        })
    }

    /// Counts a new node against the node limit.
    fn node(&mut self, node: Node) -> Result<Node, ExprError> {
        self.nodes += 1;
        if self.nodes > MAX_EXPR_NODES {
            return Err(ExprError::TooManyNodes {
                max_nodes: MAX_EXPR_NODES,
            });
        }
        Ok(node)
    }

    /// Runs a parser step while enforcing the nesting limit.
    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        let next_depth = self.nesting + 1;
        if next_depth > MAX_EXPR_NESTING {
            return Err(ExprError::NestingTooDeep {
                max_depth: MAX_EXPR_NESTING,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Consumes the expected token or returns an error.
    fn expect(&mut self, token: &Token<'_>, expected: &'static str) -> Result<(), ExprError> {
        if self.matches(token).is_some() {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                expected,
                found: self.current().token.describe(),
                position: self.current().position,
            })
        }
    }

    /// Ensures the parser is at end-of-input.
    fn expect_eof(&self) -> Result<(), ExprError> {
        if matches!(self.current().token, Token::Eof) {
            Ok(())
        } else {
            Err(ExprError::TrailingInput {
                position: self.current().position,
            })
        }
    }

    /// Consumes the token if it has the same kind, returning its position.
    fn matches(&mut self, kind: &Token<'_>) -> Option<usize> {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken<'input> {
        debug_assert!(self.index < self.tokens.len(), "parser index out of bounds");
        &self.tokens[self.index]
    }

    /// Advances to the next token, returning the position of the consumed one.
    fn advance(&mut self) -> usize {
        let position = self.current().position;
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        position
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::MAX_EXPR_NESTING;
    use super::parse;
    use crate::ast::BinaryOp;
    use crate::ast::Node;
    use crate::error::ExprError;

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let Node::Binary {
            op,
            right,
            ..
        } = parse("1 + 2 * 3").unwrap()
        else {
            unreachable!("expected binary root");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *right,
            Node::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let Node::Binary {
            op, ..
        } = parse("a || b && c").unwrap()
        else {
            unreachable!("expected binary root");
        };
        assert_eq!(op, BinaryOp::Or);
    }

    #[test]
    fn unknown_function_is_rejected_at_parse_time() {
        assert!(matches!(
            parse("exec('rm')"),
            Err(ExprError::UnknownFunction {
                position: 0,
                ..
            })
        ));
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(
            parse("len(a, b)"),
            Err(ExprError::WrongArity {
                function: "len",
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let depth = MAX_EXPR_NESTING + 1;
        let input = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(matches!(parse(&input), Err(ExprError::NestingTooDeep { .. })));
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert_eq!(
            parse("a b"),
            Err(ExprError::TrailingInput {
                position: 2
            })
        );
    }
}
