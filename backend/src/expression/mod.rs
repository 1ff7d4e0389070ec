//! Expression language
//!
//! Small formula language used for routing conditions and assignments.
//!
//! # Syntax
//!
//! - Numbers (`3`, `2.5`, `1e-3`) and text literals (`"gold"`, `'gold'`)
//! - Variables, resolved case-insensitively. A client's own numeric values
//!   shadow global variables of the same name.
//! - Operators: `+ - * / ^`, comparisons `< <= > >= = == != <>`,
//!   logic `&& || !` (also `and`, `or`, `not`)
//! - Built-in functions; arguments are separated by `;` or `,`
//!
//! # Example
//!
//! ```rust
//! use queuesim_core_rs::expression::{EmptySystem, EvalContext, Expression};
//! use queuesim_core_rs::VariableEnvironment;
//!
//! let mut variables = VariableEnvironment::new();
//! variables.set_number("x", 5.0);
//!
//! let expr = Expression::parse("if(x > 3; x * 2; 0)").unwrap();
//! let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
//! assert_eq!(expr.evaluate_number(&ctx).unwrap(), 10.0);
//! ```

pub mod context;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod validation;

pub use context::{EmptySystem, EvalContext, SystemView};
pub use interpreter::EvalError;
pub use parser::{ParseError, ParseErrorKind};
pub use types::{BinaryOp, Function, Node, UnaryOp, Value};
pub use validation::{check, check_with, CheckError, KnownSymbols};

use std::fmt;

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let root = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Evaluate to a value of any type
    pub fn evaluate(&self, ctx: &EvalContext) -> Result<Value, EvalError> {
        interpreter::evaluate(&self.root, ctx)
    }

    /// Evaluate and require a number (booleans become 1 / 0)
    pub fn evaluate_number(&self, ctx: &EvalContext) -> Result<f64, EvalError> {
        self.evaluate(ctx)?.as_number()
    }

    /// Evaluate and interpret the result as a condition
    pub fn evaluate_bool(&self, ctx: &EvalContext) -> Result<bool, EvalError> {
        self.evaluate(ctx)?.as_bool()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
