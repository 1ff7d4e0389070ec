// Routing - decision
//
// Router: a compiled policy bound to its destination list, plus the
// per-instance state (sequence position, error and selection counters).

use crate::expression::EvalContext;
use crate::models::{Client, StationId};
use crate::rng::RngManager;
use crate::routing::types::{LoadMeasure, Lookahead, RoutingPolicy, TieBreak};
use crate::routing::validation::RoutingError;
use tracing::warn;

/// Upper bound on pass-through stations followed by next-process lookahead
pub const MAX_LOOKAHEAD_HOPS: usize = 32;

/// Station load as seen by load-based policies
pub trait LoadView {
    /// Clients waiting in the station's queue
    fn queue_length(&self, station: StationId) -> usize;

    /// Clients at the station, waiting or in service
    fn client_count(&self, station: StationId) -> usize;

    /// The single station a pass-through station forwards every client to
    ///
    /// `None` for stations that hold clients, and for routing stations with
    /// more than one destination.
    fn pass_through_successor(&self, station: StationId) -> Option<StationId>;
}

/// Routing decision maker for one decide station
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::expression::{EmptySystem, EvalContext};
/// use queuesim_core_rs::routing::{NoLoad, Router, RoutingPolicy, TieBreak};
/// use queuesim_core_rs::{Client, RngManager, StationId, VariableEnvironment};
///
/// let mut router = Router::new(
///     vec![StationId(1), StationId(2)],
///     RoutingPolicy::Sequence { multiplicity: vec![2, 1] },
///     TieBreak::LowestIndex,
/// )
/// .unwrap();
///
/// let client = Client::new(1, "standard", 0.0);
/// let variables = VariableEnvironment::new();
/// let ctx = EvalContext::new(&variables, &EmptySystem, 0.0);
/// let mut rng = RngManager::new(1);
///
/// let picks: Vec<usize> = (0..6)
///     .map(|_| router.decide(&client, &ctx, &NoLoad, &mut rng).unwrap())
///     .collect();
/// assert_eq!(picks, vec![0, 0, 1, 0, 0, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    destinations: Vec<StationId>,
    policy: RoutingPolicy,
    tie_break: TieBreak,
    /// Sequence policy: current destination and how often it was taken
    sequence_position: usize,
    sequence_taken: u32,
    evaluation_errors: u64,
    selections: Vec<u64>,
}

impl Router {
    /// Bind a compiled policy to its destinations
    ///
    /// Fails if the destination list is empty or the policy's parallel
    /// lists do not fit it.
    pub fn new(
        destinations: Vec<StationId>,
        policy: RoutingPolicy,
        tie_break: TieBreak,
    ) -> Result<Self, RoutingError> {
        let n = destinations.len();
        if n == 0 {
            return Err(RoutingError::NoDestinations);
        }

        let (list, len, exact) = match &policy {
            RoutingPolicy::Probabilistic { weights } => ("weights", weights.len(), true),
            RoutingPolicy::Sequence { multiplicity } => ("multiplicities", multiplicity.len(), true),
            RoutingPolicy::Conditional { conditions } => ("conditions", conditions.len(), false),
            RoutingPolicy::ByClientType { client_types } => {
                ("client type lists", client_types.len(), false)
            }
            RoutingPolicy::KeyValue { values, .. } => ("values", values.len(), false),
            RoutingPolicy::ShortestQueue(_)
            | RoutingPolicy::FewestClients(_)
            | RoutingPolicy::LongestQueue(_)
            | RoutingPolicy::MostClients(_) => ("", 0, false),
        };
        if (exact && len != n) || len > n {
            return Err(RoutingError::Inconsistent(format!(
                "{} has {} entries for {} destinations",
                list, len, n
            )));
        }
        if let RoutingPolicy::Sequence { multiplicity } = &policy {
            if let Some(index) = multiplicity.iter().position(|&m| m == 0) {
                return Err(RoutingError::ZeroMultiplicity { index });
            }
        }

        Ok(Self {
            destinations,
            policy,
            tie_break,
            sequence_position: 0,
            sequence_taken: 0,
            evaluation_errors: 0,
            selections: vec![0; n],
        })
    }

    pub fn destinations(&self) -> &[StationId] {
        &self.destinations
    }

    pub fn destination(&self, index: usize) -> Option<StationId> {
        self.destinations.get(index).copied()
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Conditions that failed to evaluate and were treated as false
    pub fn evaluation_errors(&self) -> u64 {
        self.evaluation_errors
    }

    /// How often each destination was selected
    pub fn selections(&self) -> &[u64] {
        &self.selections
    }

    /// Pick a destination index for `client`
    ///
    /// `ctx` should carry the same client so conditions see its values.
    pub fn decide(
        &mut self,
        client: &Client,
        ctx: &EvalContext,
        load: &dyn LoadView,
        rng: &mut RngManager,
    ) -> Result<usize, RoutingError> {
        let index = self.choose(client, ctx, load, rng)?;
        if index >= self.destinations.len() {
            return Err(RoutingError::Inconsistent(format!(
                "{} policy chose index {} of {}",
                self.policy.mode_name(),
                index,
                self.destinations.len()
            )));
        }
        self.selections[index] += 1;
        Ok(index)
    }

    fn choose(
        &mut self,
        client: &Client,
        ctx: &EvalContext,
        load: &dyn LoadView,
        rng: &mut RngManager,
    ) -> Result<usize, RoutingError> {
        let fallback = self.destinations.len() - 1;

        match &self.policy {
            RoutingPolicy::Probabilistic { weights } => rng
                .weighted_index(weights)
                .ok_or_else(|| RoutingError::Inconsistent("no positive routing weight".into())),

            RoutingPolicy::Conditional { conditions } => {
                for (index, condition) in conditions.iter().enumerate() {
                    match condition.evaluate_bool(ctx) {
                        Ok(true) => return Ok(index),
                        Ok(false) => {}
                        Err(error) => {
                            self.evaluation_errors += 1;
                            warn!(
                                condition = condition.source(),
                                client = client.id(),
                                %error,
                                "routing condition failed, treating as false"
                            );
                        }
                    }
                }
                Ok(fallback)
            }

            RoutingPolicy::ByClientType { client_types } => Ok(client_types
                .iter()
                .position(|types| types.iter().any(|t| t == client.client_type()))
                .unwrap_or(fallback)),

            RoutingPolicy::Sequence { multiplicity } => {
                let index = self.sequence_position;
                self.sequence_taken += 1;
                if self.sequence_taken >= multiplicity[index] {
                    self.sequence_taken = 0;
                    self.sequence_position = (index + 1) % multiplicity.len();
                }
                Ok(index)
            }

            RoutingPolicy::ShortestQueue(lookahead) => {
                Ok(self.by_load(LoadMeasure::QueueLength, *lookahead, false, load, rng))
            }
            RoutingPolicy::FewestClients(lookahead) => {
                Ok(self.by_load(LoadMeasure::ClientCount, *lookahead, false, load, rng))
            }
            RoutingPolicy::LongestQueue(lookahead) => {
                Ok(self.by_load(LoadMeasure::QueueLength, *lookahead, true, load, rng))
            }
            RoutingPolicy::MostClients(lookahead) => {
                Ok(self.by_load(LoadMeasure::ClientCount, *lookahead, true, load, rng))
            }

            RoutingPolicy::KeyValue { key, values } => {
                let Some(value) = client.text(key) else {
                    return Ok(fallback);
                };
                Ok(values
                    .iter()
                    .position(|alternatives| alternatives.iter().any(|v| v == value))
                    .unwrap_or(fallback))
            }
        }
    }

    fn by_load(
        &self,
        measure: LoadMeasure,
        lookahead: Lookahead,
        maximize: bool,
        load: &dyn LoadView,
        rng: &mut RngManager,
    ) -> usize {
        let loads: Vec<usize> = self
            .destinations
            .iter()
            .map(|&destination| {
                let station = match lookahead {
                    Lookahead::NextStation => destination,
                    Lookahead::NextProcessStation => resolve_process_station(destination, load),
                };
                match measure {
                    LoadMeasure::QueueLength => load.queue_length(station),
                    LoadMeasure::ClientCount => load.client_count(station),
                }
            })
            .collect();

        let best = if maximize {
            loads.iter().max()
        } else {
            loads.iter().min()
        };
        let Some(&best) = best else {
            return 0;
        };

        let candidates: Vec<usize> = loads
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == best)
            .map(|(i, _)| i)
            .collect();

        match self.tie_break {
            TieBreak::LowestIndex => candidates[0],
            TieBreak::Random => candidates[rng.index(candidates.len())],
        }
    }
}

/// Follow single-successor pass-through stations to the station that holds
/// clients, giving up after [`MAX_LOOKAHEAD_HOPS`]
pub fn resolve_process_station(start: StationId, load: &dyn LoadView) -> StationId {
    let mut station = start;
    for _ in 0..MAX_LOOKAHEAD_HOPS {
        match load.pass_through_successor(station) {
            Some(next) if next != start => station = next,
            _ => break,
        }
    }
    station
}

/// Load view where every station is empty and nothing passes through
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoad;

impl LoadView for NoLoad {
    fn queue_length(&self, _station: StationId) -> usize {
        0
    }

    fn client_count(&self, _station: StationId) -> usize {
        0
    }

    fn pass_through_successor(&self, _station: StationId) -> Option<StationId> {
        None
    }
}
