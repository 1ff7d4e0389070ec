// Expression language - type definitions
//
// Syntax tree produced by the parser and the runtime value type produced by
// the interpreter.

use crate::expression::interpreter::EvalError;
use std::fmt;

// ============================================================================
// VALUES
// ============================================================================

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Numeric view of the value (booleans map to 1.0 / 0.0)
    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(_) => Err(EvalError::TypeMismatch {
                expected: "number",
                found: "text",
            }),
        }
    }

    /// Truth value: booleans as is, numbers are true when non-zero
    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) if n.is_nan() => Err(EvalError::NotABoolean),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(_) => Err(EvalError::TypeMismatch {
                expected: "boolean",
                found: "text",
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Integral values print without a fractional part ("3" rather than "3.0")
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

// ============================================================================
// BUILT-IN FUNCTIONS
// ============================================================================

/// Built-in functions available in every expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Clients in the system, or at the named station
    Wip,
    /// Clients waiting in queues, or in the named station's queue
    Nq,
    /// Current simulated time in seconds
    Time,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Floor,
    Ceil,
    Round,
    Sign,
    Min,
    Max,
    Mod,
    If,
    /// Text attribute of the current client
    Text,
    /// Numeric value of the current client
    Number,
}

impl Function {
    /// Resolve a function by its (case-insensitive) name
    pub fn lookup(name: &str) -> Option<Self> {
        let function = match name.to_lowercase().as_str() {
            "wip" => Function::Wip,
            "nq" => Function::Nq,
            "time" => Function::Time,
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "exp" => Function::Exp,
            "ln" | "log" => Function::Ln,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "sign" => Function::Sign,
            "min" => Function::Min,
            "max" => Function::Max,
            "mod" => Function::Mod,
            "if" => Function::If,
            "text" => Function::Text,
            "number" => Function::Number,
            _ => return None,
        };
        Some(function)
    }

    /// Allowed number of arguments as (min, max)
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Wip | Function::Nq => (0, Some(1)),
            Function::Time => (0, Some(0)),
            Function::Abs
            | Function::Sqrt
            | Function::Exp
            | Function::Ln
            | Function::Floor
            | Function::Ceil
            | Function::Round
            | Function::Sign
            | Function::Text
            | Function::Number => (1, Some(1)),
            Function::Min | Function::Max => (1, None),
            Function::Mod => (2, Some(2)),
            Function::If => (3, Some(3)),
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.map_or(true, |max| count <= max)
    }
}

// ============================================================================
// SYNTAX TREE
// ============================================================================

/// Node of a parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Text(String),
    /// Variable reference; `name` is stored lower-cased
    Variable { name: String, position: usize },
    Unary { op: UnaryOp, operand: Box<Node> },
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },
    Call { function: Function, args: Vec<Node>, position: usize },
}

impl Node {
    /// Visit every variable reference in evaluation order
    pub fn for_each_variable<'a>(&'a self, f: &mut impl FnMut(&'a str, usize)) {
        match self {
            Node::Number(_) | Node::Text(_) => {}
            Node::Variable { name, position } => f(name, *position),
            Node::Unary { operand, .. } => operand.for_each_variable(f),
            Node::Binary { left, right, .. } => {
                left.for_each_variable(f);
                right.for_each_variable(f);
            }
            Node::Call { args, .. } => {
                for arg in args {
                    arg.for_each_variable(f);
                }
            }
        }
    }

    /// Visit every function call in evaluation order
    pub fn for_each_call<'a>(&'a self, f: &mut impl FnMut(Function, &'a [Node], usize)) {
        match self {
            Node::Number(_) | Node::Text(_) | Node::Variable { .. } => {}
            Node::Unary { operand, .. } => operand.for_each_call(f),
            Node::Binary { left, right, .. } => {
                left.for_each_call(f);
                right.for_each_call(f);
            }
            Node::Call { function, args, position } => {
                f(*function, args, *position);
                for arg in args {
                    arg.for_each_call(f);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_lookup_is_case_insensitive() {
        assert_eq!(Function::lookup("WIP"), Some(Function::Wip));
        assert_eq!(Function::lookup("Log"), Some(Function::Ln));
        assert_eq!(Function::lookup("nope"), None);
    }

    #[test]
    fn test_function_arity() {
        assert!(Function::Wip.accepts(0));
        assert!(Function::Wip.accepts(1));
        assert!(!Function::Wip.accepts(2));
        assert!(Function::Max.accepts(7));
        assert!(!Function::Max.accepts(0));
        assert!(!Function::If.accepts(2));
    }

    #[test]
    fn test_value_truthiness() {
        assert!(Value::Number(2.0).as_bool().unwrap());
        assert!(!Value::Number(0.0).as_bool().unwrap());
        assert_eq!(Value::Number(f64::NAN).as_bool(), Err(EvalError::NotABoolean));
        assert!(Value::Text("x".into()).as_bool().is_err());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
