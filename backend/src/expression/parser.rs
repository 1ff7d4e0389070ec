// Expression language - recursive descent parser
//
// Precedence, loosest first:
//   ||  &&  comparisons  + -  * /  unary - !  ^
// `^` is right-associative and binds tighter than unary minus, so
// `-2^2` is -4 and `2^-1` is 0.5.

use crate::expression::lexer::{tokenize, Token, TokenKind};
use crate::expression::types::{BinaryOp, Function, Node, UnaryOp};
use std::fmt;
use thiserror::Error;

/// Deepest nesting of parentheses, calls and prefix operators
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    InvalidCharacter(char),
    InvalidNumber(String),
    UnterminatedText,
    UnexpectedToken,
    UnexpectedEnd,
    UnknownFunction(String),
    WrongArgumentCount { function: String, found: usize },
    Empty,
    TooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidCharacter(c) => write!(f, "invalid character '{}'", c),
            ParseErrorKind::InvalidNumber(s) => write!(f, "invalid number '{}'", s),
            ParseErrorKind::UnterminatedText => f.write_str("unterminated text literal"),
            ParseErrorKind::UnexpectedToken => f.write_str("unexpected token"),
            ParseErrorKind::UnexpectedEnd => f.write_str("unexpected end of expression"),
            ParseErrorKind::UnknownFunction(name) => write!(f, "unknown function '{}'", name),
            ParseErrorKind::WrongArgumentCount { function, found } => {
                write!(f, "wrong number of arguments for '{}': {}", function, found)
            }
            ParseErrorKind::Empty => f.write_str("empty expression"),
            ParseErrorKind::TooDeep => write!(f, "nesting deeper than {} levels", MAX_DEPTH),
        }
    }
}

/// Syntax error with the 0-based character offset where it was detected
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(position: usize, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Parse expression text into a syntax tree
pub fn parse(source: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(source)?;
    let end = source.chars().count();
    if tokens.is_empty() {
        return Err(ParseError::new(0, ParseErrorKind::Empty));
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end,
        depth: 0,
    };
    let node = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::new(
            token.position,
            ParseErrorKind::UnexpectedToken,
        ));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    /// Character length of the source, reported for errors at end of input
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(ParseError::new(
                token.position,
                ParseErrorKind::UnexpectedToken,
            )),
            None => Err(ParseError::new(self.end, ParseErrorKind::UnexpectedEnd)),
        }
    }

    /// Run `inner` one nesting level down
    fn nested(
        &mut self,
        position: usize,
        inner: fn(&mut Self) -> Result<Node, ParseError>,
    ) -> Result<Node, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(position, ParseErrorKind::TooDeep));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == Some(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_comparison()?;
        while self.peek_kind() == Some(&TokenKind::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let position = self.position();
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.advance();
                let operand = self.nested(position, Self::parse_unary)?;
                Ok(Node::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(TokenKind::Plus) => {
                self.advance();
                self.nested(position, Self::parse_unary)
            }
            Some(TokenKind::Not) => {
                self.advance();
                let operand = self.nested(position, Self::parse_unary)?;
                Ok(Node::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Node, ParseError> {
        let base = self.parse_primary()?;
        if self.peek_kind() == Some(&TokenKind::Caret) {
            let position = self.position();
            self.advance();
            // Right operand goes back through unary, which gives right-associativity
            let exponent = self.nested(position, Self::parse_unary)?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(ParseError::new(self.end, ParseErrorKind::UnexpectedEnd)),
        };

        match token.kind {
            TokenKind::Number(n) => Ok(Node::Number(n)),
            TokenKind::Text(s) => Ok(Node::Text(s)),
            TokenKind::LParen => {
                let inner = self.nested(token.position, Self::parse_or)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    self.parse_call(name, token.position)
                } else {
                    Ok(Node::Variable {
                        name: name.to_lowercase(),
                        position: token.position,
                    })
                }
            }
            _ => Err(ParseError::new(
                token.position,
                ParseErrorKind::UnexpectedToken,
            )),
        }
    }

    fn parse_call(&mut self, name: String, position: usize) -> Result<Node, ParseError> {
        let function = Function::lookup(&name)
            .ok_or_else(|| ParseError::new(position, ParseErrorKind::UnknownFunction(name.clone())))?;
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(&TokenKind::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.nested(self.position(), Self::parse_or)?);
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::Separator,
                        ..
                    }) => continue,
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => break,
                    Some(other) => {
                        return Err(ParseError::new(
                            other.position,
                            ParseErrorKind::UnexpectedToken,
                        ))
                    }
                    None => return Err(ParseError::new(self.end, ParseErrorKind::UnexpectedEnd)),
                }
            }
        }

        if !function.accepts(args.len()) {
            return Err(ParseError::new(
                position,
                ParseErrorKind::WrongArgumentCount {
                    function: name,
                    found: args.len(),
                },
            ));
        }

        Ok(Node::Call {
            function,
            args,
            position,
        })
    }
}

fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
    Node::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_mul_over_add() {
        let node = parse("1 + 2 * 3").unwrap();
        match node {
            Node::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Node::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let node = parse("2^3^2").unwrap();
        match node {
            Node::Binary { op: BinaryOp::Pow, left, right } => {
                assert_eq!(*left, Node::Number(2.0));
                assert!(matches!(*right, Node::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_variable_names_lowercased() {
        assert_eq!(
            parse("Queue_Len").unwrap(),
            Node::Variable {
                name: "queue_len".into(),
                position: 0
            }
        );
    }

    #[test]
    fn test_missing_operand_reports_end_position() {
        let err = parse("x >").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEnd);
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        let err = parse("(1 + 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEnd);
        assert_eq!(err.position, 6);

        let err = parse("1 + 2)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.position, 5);
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("1 + foo(2)").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.kind, ParseErrorKind::UnknownFunction("foo".into()));
    }

    #[test]
    fn test_wrong_argument_count() {
        let err = parse("if(x; 1)").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(matches!(err.kind, ParseErrorKind::WrongArgumentCount { found: 2, .. }));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&deep).unwrap(), Node::Number(1.0));

        let too_deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&too_deep).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeep);
        assert_eq!(err.position, MAX_DEPTH);
    }

    #[test]
    fn test_prefix_chain_is_bounded() {
        let err = parse(&format!("{}x", "-".repeat(MAX_DEPTH + 1))).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeep);
        assert_eq!(err.position, MAX_DEPTH);

        let err = parse(&format!("abs({}2)", "2^".repeat(MAX_DEPTH))).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeep);
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse("   ").unwrap_err().kind, ParseErrorKind::Empty);
    }

    #[test]
    fn test_call_without_arguments() {
        assert_eq!(
            parse("wip()").unwrap(),
            Node::Call {
                function: Function::Wip,
                args: vec![],
                position: 0
            }
        );
    }
}
