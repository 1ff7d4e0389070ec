//! Routing / decision policies
//!
//! A decide station owns a [`Router`] that picks one of its N destinations
//! for every client passing through.
//!
//! # Modes
//!
//! - **Probabilistic**: random split proportional to configured rates
//! - **Conditional**: first true condition; the last destination is the else
//! - **ByClientType**: first list containing the client's type
//! - **Sequence**: round robin with per-destination multiplicity
//! - **ShortestQueue / FewestClients / LongestQueue / MostClients**: compare
//!   destination load, optionally looking through pass-through stations
//! - **KeyValue**: match a client text attribute; the last destination is
//!   the else
//!
//! Configuration is validated by [`compile_policy`], which reports every
//! problem at once.

pub mod decide;
pub mod types;
pub mod validation;

pub use decide::{resolve_process_station, LoadView, NoLoad, Router, MAX_LOOKAHEAD_HOPS};
pub use types::{LoadMeasure, Lookahead, RoutingPolicy, RoutingPolicyConfig, TieBreak};
pub use validation::{compile_policy, RoutingError, ValidationResult};
