// Expression language - evaluation context
//
// Everything an expression can read while it is evaluated: global
// variables, the client being routed or assigned (if any), station
// occupancy and the current time.

use crate::expression::interpreter::EvalError;
use crate::expression::types::Value;
use crate::models::client::Client;
use crate::models::state::VariableEnvironment;

/// Read-only view of station occupancy used by `wip()` and `nq()`
pub trait SystemView {
    /// Total number of clients in the system
    fn wip(&self) -> usize;

    /// Clients at the named station, `None` if no such station exists
    fn wip_at(&self, station: &str) -> Option<usize>;

    /// Total number of clients waiting in queues
    fn queue_length(&self) -> usize;

    /// Clients waiting at the named station, `None` if no such station exists
    fn queue_length_at(&self, station: &str) -> Option<usize>;
}

/// A system with no stations, for evaluating expressions outside a run
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySystem;

impl SystemView for EmptySystem {
    fn wip(&self) -> usize {
        0
    }

    fn wip_at(&self, _station: &str) -> Option<usize> {
        None
    }

    fn queue_length(&self) -> usize {
        0
    }

    fn queue_length_at(&self, _station: &str) -> Option<usize> {
        None
    }
}

/// Evaluation context
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::expression::{EmptySystem, EvalContext, Expression, Value};
/// use queuesim_core_rs::VariableEnvironment;
///
/// let mut variables = VariableEnvironment::new();
/// variables.set_number("Threshold", 4.0);
///
/// let expr = Expression::parse("threshold * 2").unwrap();
/// let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
/// assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Number(8.0));
/// ```
pub struct EvalContext<'a> {
    variables: &'a VariableEnvironment,
    client: Option<&'a Client>,
    system: &'a dyn SystemView,
    time: f64,
}

impl<'a> EvalContext<'a> {
    pub fn new(variables: &'a VariableEnvironment, system: &'a dyn SystemView, time: f64) -> Self {
        Self {
            variables,
            client: None,
            system,
            time,
        }
    }

    /// Attach the client whose values shadow global variables
    pub fn with_client(mut self, client: &'a Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn client(&self) -> Option<&'a Client> {
        self.client
    }

    pub fn system(&self) -> &'a dyn SystemView {
        self.system
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Resolve a (lower-cased) variable name
    ///
    /// Client-local values shadow globals: client number, client text,
    /// global number, global text.
    pub fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(client) = self.client {
            if let Some(value) = client.number(name) {
                return Ok(Value::Number(value));
            }
            if let Some(text) = client.text(name) {
                return Ok(Value::Text(text.to_string()));
            }
        }
        if let Some(value) = self.variables.number(name) {
            return Ok(Value::Number(value));
        }
        if let Some(text) = self.variables.text(name) {
            return Ok(Value::Text(text.to_string()));
        }
        Err(EvalError::UnknownVariable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_shadows_global() {
        let mut variables = VariableEnvironment::new();
        variables.set_number("x", 1.0);
        let mut client = Client::new(1, "standard", 0.0);
        client.set_number("X", 5.0);

        let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
        assert_eq!(ctx.lookup("x").unwrap(), Value::Number(1.0));

        let ctx = ctx.with_client(&client);
        assert_eq!(ctx.lookup("x").unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_client_text_shadows_global_number() {
        let mut variables = VariableEnvironment::new();
        variables.set_number("tier", 3.0);
        let mut client = Client::new(1, "standard", 0.0);
        client.set_text("Tier", "gold");

        let ctx = EvalContext::new(&variables, &EmptySystem, 0.0).with_client(&client);
        assert_eq!(ctx.lookup("tier").unwrap(), Value::Text("gold".into()));
    }

    #[test]
    fn test_unknown_variable() {
        let variables = VariableEnvironment::new();
        let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
        assert_eq!(
            ctx.lookup("missing"),
            Err(EvalError::UnknownVariable("missing".into()))
        );
    }

    #[test]
    fn test_global_text_variable() {
        let mut variables = VariableEnvironment::new();
        variables.set_text("Mode", "rush");
        let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
        assert_eq!(ctx.lookup("mode").unwrap(), Value::Text("rush".into()));
    }
}
