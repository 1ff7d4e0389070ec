// Expression language - static checks
//
// Parses an expression and verifies that every variable it references is
// declared, and that every literal station name passed to wip()/nq()
// exists. Runs once when a model is compiled, so that a typo is reported
// with its position instead of failing mid-run.

use crate::expression::parser::ParseError;
use crate::expression::types::{Function, Node};
use crate::expression::Expression;
use std::collections::HashSet;
use thiserror::Error;

/// Why an expression failed its static check
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    #[error("{0}")]
    Syntax(#[from] ParseError),

    #[error("undeclared variable '{name}' at position {position}")]
    UndeclaredVariable { name: String, position: usize },

    #[error("unknown station '{name}' at position {position}")]
    UnknownStation { name: String, position: usize },
}

impl CheckError {
    /// 0-based character offset of the problem
    pub fn position(&self) -> usize {
        match self {
            CheckError::Syntax(e) => e.position,
            CheckError::UndeclaredVariable { position, .. } => *position,
            CheckError::UnknownStation { position, .. } => *position,
        }
    }
}

/// Names an expression may refer to
///
/// All names are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KnownSymbols {
    variables: HashSet<String>,
    stations: Option<HashSet<String>>,
}

impl KnownSymbols {
    pub fn new<S: AsRef<str>>(variables: impl IntoIterator<Item = S>) -> Self {
        Self {
            variables: variables
                .into_iter()
                .map(|v| v.as_ref().to_lowercase())
                .collect(),
            stations: None,
        }
    }

    /// Also check literal station names in `wip("..")` and `nq("..")`
    pub fn with_stations<S: AsRef<str>>(mut self, stations: impl IntoIterator<Item = S>) -> Self {
        self.stations = Some(
            stations
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    pub fn knows_variable(&self, name: &str) -> bool {
        self.variables.contains(&name.to_lowercase())
    }
}

/// Parse `source` and check it against the declared variables
///
/// Returns the parsed expression on success, so callers can keep it
/// instead of parsing twice.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::expression::check;
///
/// assert!(check("x > 10", &["X"]).is_ok());
///
/// let err = check("x + y", &["x"]).unwrap_err();
/// assert_eq!(err.position(), 4);
/// ```
pub fn check<S: AsRef<str>>(source: &str, known_variables: &[S]) -> Result<Expression, CheckError> {
    check_with(source, &KnownSymbols::new(known_variables.iter().map(|s| s.as_ref())))
}

/// Like [`check`] with a prepared symbol table
pub fn check_with(source: &str, symbols: &KnownSymbols) -> Result<Expression, CheckError> {
    let expression = Expression::parse(source)?;
    check_node(expression.root(), symbols)?;
    Ok(expression)
}

fn check_node(root: &Node, symbols: &KnownSymbols) -> Result<(), CheckError> {
    let mut first_error: Option<CheckError> = None;

    root.for_each_variable(&mut |name, position| {
        if first_error.is_none() && !symbols.knows_variable(name) {
            first_error = Some(CheckError::UndeclaredVariable {
                name: name.to_string(),
                position,
            });
        }
    });
    if let Some(err) = first_error {
        return Err(err);
    }

    if let Some(stations) = &symbols.stations {
        root.for_each_call(&mut |function, args, position| {
            if first_error.is_some() || !matches!(function, Function::Wip | Function::Nq) {
                return;
            }
            if let Some(Node::Text(name)) = args.first() {
                if !stations.contains(&name.to_lowercase()) {
                    first_error = Some(CheckError::UnknownStation {
                        name: name.clone(),
                        position,
                    });
                }
            }
        });
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::ParseErrorKind;

    #[test]
    fn test_declared_variables_pass() {
        assert!(check("a + B * c", &["A", "b", "C"]).is_ok());
    }

    #[test]
    fn test_undeclared_variable_position() {
        let err = check("a + missing", &["a"]).unwrap_err();
        assert_eq!(
            err,
            CheckError::UndeclaredVariable {
                name: "missing".into(),
                position: 4
            }
        );
    }

    #[test]
    fn test_syntax_error_position() {
        let err = check("a + * b", &["a", "b"]).unwrap_err();
        assert_eq!(err.position(), 4);
        assert!(matches!(
            err,
            CheckError::Syntax(ParseError {
                kind: ParseErrorKind::UnexpectedToken,
                ..
            })
        ));
    }

    #[test]
    fn test_station_names_checked_when_known() {
        let symbols = KnownSymbols::new(Vec::<String>::new()).with_stations(["Counter"]);
        assert!(check_with("wip(\"counter\") > 2", &symbols).is_ok());

        let err = check_with("1 + nq(\"desk\")", &symbols).unwrap_err();
        assert_eq!(err.position(), 4);
    }
}
