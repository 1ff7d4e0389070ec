// Expression language - interpreter
//
// Evaluates a parsed syntax tree against an EvalContext. Every operand of
// every operator and every function argument is evaluated, left to right,
// before the operator is applied. There is no short-circuiting, so errors
// in either branch of `&&`, `||` or `if()` always surface.

use crate::expression::context::EvalContext;
use crate::expression::types::{format_number, BinaryOp, Function, Node, UnaryOp, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// Tolerance for numeric equality
const FLOAT_EPSILON: f64 = 1e-9;

/// Errors that can occur while evaluating an expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown station: {0}")]
    UnknownStation(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value is not a boolean")]
    NotABoolean,

    #[error("No client in context for {0}()")]
    NoClient(&'static str),

    #[error("Client has no numeric value '{0}'")]
    MissingClientValue(String),

    #[error("Result is not a finite number")]
    NotFinite,
}

// ============================================================================
// NODE EVALUATION
// ============================================================================

/// Evaluate a syntax tree node
pub fn evaluate(node: &Node, ctx: &EvalContext) -> Result<Value, EvalError> {
    match node {
        Node::Number(n) => Ok(Value::Number(*n)),
        Node::Text(s) => Ok(Value::Text(s.clone())),
        Node::Variable { name, .. } => ctx.lookup(name),
        Node::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-value.as_number()?)),
                UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
            }
        }
        Node::Binary { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            apply_binary(*op, left, right)
        }
        Node::Call { function, args, .. } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &values, ctx)
        }
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Text(_), _) | (_, Value::Text(_)) => {
                Ok(Value::Text(format!("{}{}", left, right)))
            }
            _ => Ok(Value::Number(left.as_number()? + right.as_number()?)),
        },
        BinaryOp::Sub => Ok(Value::Number(left.as_number()? - right.as_number()?)),
        BinaryOp::Mul => Ok(Value::Number(left.as_number()? * right.as_number()?)),
        BinaryOp::Div => {
            let divisor = right.as_number()?;
            if divisor.abs() < f64::EPSILON {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(left.as_number()? / divisor))
        }
        BinaryOp::Pow => Ok(Value::Number(left.as_number()?.powf(right.as_number()?))),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right)?)),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right)?)),
        BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(&left, &right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(&left, &right)? != Ordering::Less)),
        BinaryOp::And => Ok(Value::Bool(left.as_bool()? & right.as_bool()?)),
        BinaryOp::Or => Ok(Value::Bool(left.as_bool()? | right.as_bool()?)),
    }
}

fn values_equal(left: &Value, right: &Value) -> Result<bool, EvalError> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(a == b),
        (Value::Text(_), other) | (other, Value::Text(_)) => Err(EvalError::TypeMismatch {
            expected: "text",
            found: other.type_name(),
        }),
        _ => Ok((left.as_number()? - right.as_number()?).abs() < FLOAT_EPSILON),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Text(_), other) | (other, Value::Text(_)) => Err(EvalError::TypeMismatch {
            expected: "text",
            found: other.type_name(),
        }),
        _ => {
            let a = left.as_number()?;
            let b = right.as_number()?;
            a.partial_cmp(&b).ok_or(EvalError::NotFinite)
        }
    }
}

// ============================================================================
// BUILT-IN FUNCTIONS
// ============================================================================

fn call(function: Function, args: &[Value], ctx: &EvalContext) -> Result<Value, EvalError> {
    let number = |i: usize| args[i].as_number();

    let result = match function {
        Function::Wip => match args.first() {
            None => ctx.system().wip() as f64,
            Some(station) => {
                let name = station_name(station)?;
                ctx.system()
                    .wip_at(&name)
                    .ok_or(EvalError::UnknownStation(name))? as f64
            }
        },
        Function::Nq => match args.first() {
            None => ctx.system().queue_length() as f64,
            Some(station) => {
                let name = station_name(station)?;
                ctx.system()
                    .queue_length_at(&name)
                    .ok_or(EvalError::UnknownStation(name))? as f64
            }
        },
        Function::Time => ctx.time(),
        Function::Abs => number(0)?.abs(),
        Function::Sqrt => number(0)?.sqrt(),
        Function::Exp => number(0)?.exp(),
        Function::Ln => number(0)?.ln(),
        Function::Floor => number(0)?.floor(),
        Function::Ceil => number(0)?.ceil(),
        Function::Round => number(0)?.round(),
        Function::Sign => {
            let x = number(0)?;
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Function::Min => fold_numbers(args, f64::min)?,
        Function::Max => fold_numbers(args, f64::max)?,
        Function::Mod => {
            let divisor = number(1)?;
            if divisor.abs() < f64::EPSILON {
                return Err(EvalError::DivisionByZero);
            }
            number(0)? % divisor
        }
        Function::If => {
            return if args[0].as_bool()? {
                Ok(args[1].clone())
            } else {
                Ok(args[2].clone())
            };
        }
        Function::Text => {
            let client = ctx.client().ok_or(EvalError::NoClient("text"))?;
            let key = args[0].to_string();
            return Ok(Value::Text(client.text(&key).unwrap_or_default().to_string()));
        }
        Function::Number => {
            let client = ctx.client().ok_or(EvalError::NoClient("number"))?;
            let key = args[0].to_string();
            client
                .number(&key)
                .ok_or(EvalError::MissingClientValue(key))?
        }
    };

    Ok(Value::Number(result))
}

fn station_name(value: &Value) -> Result<String, EvalError> {
    match value {
        Value::Text(name) => Ok(name.clone()),
        Value::Number(n) => Ok(format_number(*n)),
        Value::Bool(_) => Err(EvalError::TypeMismatch {
            expected: "text",
            found: "boolean",
        }),
    }
}

fn fold_numbers(args: &[Value], f: fn(f64, f64) -> f64) -> Result<f64, EvalError> {
    let mut acc = args[0].as_number()?;
    for arg in &args[1..] {
        acc = f(acc, arg.as_number()?);
    }
    Ok(acc)
}
