//! Model compilation
//!
//! Turns a [`ModelConfig`] into a [`CompiledModel`]: station names become
//! [`StationId`] handles, expressions are parsed and checked against the
//! declared variables, routing policies are compiled, and every problem
//! found along the way is collected so a model can be fixed in one pass.

use crate::arrivals::{ArrivalConfig, Distribution};
use crate::continuous::{
    ContinuousConfig, ContinuousKind, ContinuousState, TankFlow, TankFlowConfig, TankSensor,
};
use crate::expression::{check_with, Expression, KnownSymbols};
use crate::feed::{FeedSettings, FeedSourceConfig, FeedTarget};
use crate::models::{StationId, VariableEnvironment};
use crate::orchestrator::config::{ModelConfig, RunLimits, StationKind, StatisticsSettings};
use crate::routing::{compile_policy, Router, RoutingPolicy, TieBreak};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

/// One problem found while compiling a model
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{}{}{}", station_prefix(.station), .message, position_suffix(.position))]
pub struct ConfigError {
    /// Station the problem belongs to, if any
    pub station: Option<String>,
    pub message: String,
    /// Character offset inside the offending expression
    pub position: Option<usize>,
}

fn station_prefix(station: &Option<String>) -> String {
    match station {
        Some(name) => format!("station '{}': ", name),
        None => String::new(),
    }
}

fn position_suffix(position: &Option<usize>) -> String {
    match position {
        Some(p) => format!(" (at position {})", p),
        None => String::new(),
    }
}

impl ConfigError {
    pub fn model(message: impl Into<String>) -> Self {
        Self {
            station: None,
            message: message.into(),
            position: None,
        }
    }

    pub fn station(station: &str, message: impl Into<String>) -> Self {
        Self {
            station: Some(station.to_string()),
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

// ============================================================================
// Compiled model
// ============================================================================

/// Immutable, fully resolved model shared by all runs and replications
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub name: String,
    pub seed: u64,
    /// Hex SHA-256 of the canonical JSON form of the configuration
    pub model_hash: String,
    pub stations: Vec<CompiledStation>,
    pub continuous: Vec<ContinuousConfig>,
    /// Sensors in configuration order, not yet observing
    pub sensors: Vec<TankSensor>,
    pub variables: VariableEnvironment,
    pub limits: RunLimits,
    pub statistics: StatisticsSettings,
    pub record_events: bool,
}

impl CompiledModel {
    pub fn station(&self, id: StationId) -> Option<&CompiledStation> {
        self.stations.get(id.index())
    }

    pub fn station_names(&self) -> Vec<&str> {
        self.stations.iter().map(|s| s.name.as_str()).collect()
    }

    /// Station id by name, compared case-insensitively
    pub fn station_id(&self, name: &str) -> Option<StationId> {
        self.stations
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.id)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledStation {
    pub id: StationId,
    pub name: String,
    pub kind: CompiledKind,
}

/// Station behaviour with all references resolved
#[derive(Debug, Clone)]
pub enum CompiledKind {
    Source {
        arrivals: ArrivalConfig,
        next: StationId,
    },
    Process {
        servers: usize,
        service: Distribution,
        next: StationId,
    },
    Delay {
        delay: Distribution,
        next: StationId,
    },
    Decide {
        destinations: Vec<StationId>,
        policy: RoutingPolicy,
        tie_break: TieBreak,
        /// One entry per destination
        new_client_types: Vec<Option<String>>,
    },
    Assign {
        assignments: Vec<CompiledAssignment>,
        next: StationId,
    },
    Input {
        source: FeedSourceConfig,
        settings: FeedSettings,
        target: FeedTarget,
        next: StationId,
    },
    Valve {
        entity: usize,
        valve: usize,
        flow_rate: Expression,
        next: StationId,
    },
    Flow {
        flow: TankFlow,
        next: StationId,
    },
    Signal {
        signal: String,
        next: StationId,
    },
    Dispose,
}

impl CompiledKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            CompiledKind::Source { .. } => "source",
            CompiledKind::Process { .. } => "process",
            CompiledKind::Delay { .. } => "delay",
            CompiledKind::Decide { .. } => "decide",
            CompiledKind::Assign { .. } => "assign",
            CompiledKind::Input { .. } => "input",
            CompiledKind::Valve { .. } => "valve",
            CompiledKind::Flow { .. } => "flow",
            CompiledKind::Signal { .. } => "signal",
            CompiledKind::Dispose => "dispose",
        }
    }

    /// Where a station that never holds clients sends every client
    ///
    /// Decide stations count only when they have exactly one destination.
    pub fn pass_through_successor(&self) -> Option<StationId> {
        match self {
            CompiledKind::Assign { next, .. }
            | CompiledKind::Input { next, .. }
            | CompiledKind::Valve { next, .. }
            | CompiledKind::Flow { next, .. }
            | CompiledKind::Signal { next, .. } => Some(*next),
            CompiledKind::Decide { destinations, .. } if destinations.len() == 1 => {
                Some(destinations[0])
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledAssignment {
    pub target: FeedTarget,
    pub expression: Expression,
}

// ============================================================================
// Compilation
// ============================================================================

/// Resolve and check a model
///
/// # Errors
///
/// Every problem found, in station order.
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::orchestrator::{compile, ModelConfig};
///
/// let config: ModelConfig = serde_json::from_str(
///     r#"{"stations": [
///         {"name": "In", "type": "source", "next": "Nowhere",
///          "arrivals": {"client_type": "a", "inter_arrival": {"type": "fixed", "value": 1.0}}}
///     ]}"#,
/// )
/// .unwrap();
///
/// let errors = compile(&config).unwrap_err();
/// assert_eq!(errors.len(), 1);
/// assert_eq!(errors[0].station.as_deref(), Some("In"));
/// ```
pub fn compile(config: &ModelConfig) -> Result<CompiledModel, Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.stations.is_empty() {
        errors.push(ConfigError::model("model has no stations"));
    }

    // Station names → ids
    let mut ids: HashMap<String, StationId> = HashMap::new();
    for (index, station) in config.stations.iter().enumerate() {
        let key = station.name.trim().to_lowercase();
        if key.is_empty() {
            errors.push(ConfigError::model(format!("station #{} has no name", index)));
            continue;
        }
        if ids.contains_key(&key) {
            errors.push(ConfigError::station(&station.name, "duplicate station name"));
        } else {
            ids.insert(key, StationId(index));
        }
    }

    // Continuous entities
    let mut entity_ids: HashMap<String, usize> = HashMap::new();
    for (index, entity) in config.continuous.iter().enumerate() {
        if let Err(e) = ContinuousState::new(entity) {
            errors.push(ConfigError::model(format!("continuous '{}': {}", entity.name, e)));
        }
        if entity_ids.insert(entity.name.to_lowercase(), index).is_some() {
            errors.push(ConfigError::model(format!(
                "duplicate continuous entity '{}'",
                entity.name
            )));
        }
    }

    // Variables, including one read-only variable per continuous entity
    let mut variables = VariableEnvironment::new();
    let mut declared = HashSet::new();
    for (name, value) in &config.variables.numbers {
        variables.set_number(name, *value);
        declared.insert(name.to_lowercase());
    }
    for (name, value) in &config.variables.texts {
        if !declared.insert(name.to_lowercase()) {
            errors.push(ConfigError::model(format!(
                "variable '{}' is declared as number and text",
                name
            )));
        }
        variables.set_text(name, value.clone());
    }
    for entity in &config.continuous {
        if !declared.insert(entity.name.to_lowercase()) {
            errors.push(ConfigError::model(format!(
                "continuous entity '{}' shadows a variable",
                entity.name
            )));
        }
    }
    let client_local = client_local_names(config);
    let symbols = KnownSymbols::new(declared.iter().chain(client_local.iter())).with_stations(
        config.stations.iter().map(|s| s.name.as_str()),
    );

    let sensors = compile_sensors(config, &entity_ids, &mut errors);

    check_limits(config, &mut errors);

    let mut stations = Vec::with_capacity(config.stations.len());
    for (index, station) in config.stations.iter().enumerate() {
        let mut ctx = StationCompiler {
            name: &station.name,
            ids: &ids,
            errors: &mut errors,
        };
        let kind = match &station.kind {
            StationKind::Source { arrivals, next } => {
                ctx.distribution("inter-arrival", &arrivals.inter_arrival);
                ctx.resolve(next).map(|next| CompiledKind::Source {
                    arrivals: arrivals.clone(),
                    next,
                })
            }
            StationKind::Process {
                servers,
                service,
                next,
            } => {
                if *servers == 0 {
                    ctx.error("a process station needs at least one server");
                }
                ctx.distribution("service", service);
                ctx.resolve(next).map(|next| CompiledKind::Process {
                    servers: *servers,
                    service: service.clone(),
                    next,
                })
            }
            StationKind::Delay { delay, next } => {
                ctx.distribution("delay", delay);
                ctx.resolve(next).map(|next| CompiledKind::Delay {
                    delay: delay.clone(),
                    next,
                })
            }
            StationKind::Decide {
                destinations,
                policy,
                tie_break,
                new_client_types,
            } => {
                let resolved: Vec<Option<StationId>> =
                    destinations.iter().map(|d| ctx.resolve(d)).collect();
                if new_client_types.len() > destinations.len() {
                    ctx.error(format!(
                        "{} new client types for {} destinations",
                        new_client_types.len(),
                        destinations.len()
                    ));
                }
                let new_client_types: Vec<Option<String>> = (0..destinations.len())
                    .map(|i| {
                        new_client_types
                            .get(i)
                            .map(|t| t.trim())
                            .filter(|t| !t.is_empty())
                            .map(str::to_string)
                    })
                    .collect();
                let compiled = match compile_policy(
                    policy,
                    destinations.len(),
                    &symbols,
                    config.strict_validation,
                ) {
                    Ok(compiled) => Some(compiled),
                    Err(routing_errors) => {
                        for e in routing_errors {
                            let error = ConfigError::station(&station.name, e.to_string());
                            ctx.errors.push(match e.position() {
                                Some(p) => error.at(p),
                                None => error,
                            });
                        }
                        None
                    }
                };
                match (resolved.into_iter().collect::<Option<Vec<_>>>(), compiled) {
                    (Some(destinations), Some(policy)) => {
                        // Bind once so run-time construction cannot fail
                        match Router::new(destinations.clone(), policy.clone(), *tie_break) {
                            Ok(_) => Some(CompiledKind::Decide {
                                destinations,
                                policy,
                                tie_break: *tie_break,
                                new_client_types,
                            }),
                            Err(e) => {
                                ctx.error(e.to_string());
                                None
                            }
                        }
                    }
                    _ => None,
                }
            }
            StationKind::Assign { assignments, next } => {
                let mut compiled = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    ctx.target(&assignment.target, &declared);
                    if let Some(expression) = ctx.expression(&assignment.expression, &symbols) {
                        compiled.push(CompiledAssignment {
                            target: assignment.target.clone(),
                            expression,
                        });
                    }
                }
                let next = ctx.resolve(next);
                match next {
                    Some(next) if compiled.len() == assignments.len() => {
                        Some(CompiledKind::Assign {
                            assignments: compiled,
                            next,
                        })
                    }
                    _ => None,
                }
            }
            StationKind::Input {
                source,
                settings,
                target,
                next,
            } => {
                if settings.load_column.trim().is_empty() {
                    ctx.error("no load column given");
                }
                ctx.target(target, &declared);
                ctx.resolve(next).map(|next| CompiledKind::Input {
                    source: source.clone(),
                    settings: settings.clone(),
                    target: target.clone(),
                    next,
                })
            }
            StationKind::Valve {
                entity,
                valve,
                flow_rate,
                next,
            } => {
                let entity_index = entity_ids.get(&entity.to_lowercase()).copied();
                match entity_index {
                    None => ctx.error(format!("unknown continuous entity '{}'", entity)),
                    Some(i) if *valve >= config.continuous[i].valves.len() => ctx.error(format!(
                        "'{}' has no valve {}",
                        entity, valve
                    )),
                    Some(_) => {}
                }
                let expression = ctx.expression(flow_rate, &symbols);
                let next = ctx.resolve(next);
                match (entity_index, expression, next) {
                    (Some(entity), Some(flow_rate), Some(next))
                        if *valve < config.continuous[entity].valves.len() =>
                    {
                        Some(CompiledKind::Valve {
                            entity,
                            valve: *valve,
                            flow_rate,
                            next,
                        })
                    }
                    _ => None,
                }
            }
            StationKind::Flow { flow, next } => {
                let flow = ctx.flow(flow, &entity_ids);
                let next = ctx.resolve(next);
                match (flow, next) {
                    (Some(flow), Some(next)) => Some(CompiledKind::Flow { flow, next }),
                    _ => None,
                }
            }
            StationKind::Signal { signal, next } => {
                if signal.trim().is_empty() {
                    ctx.error("signal has no name");
                }
                ctx.resolve(next).map(|next| CompiledKind::Signal {
                    signal: signal.trim().to_string(),
                    next,
                })
            }
            StationKind::Dispose => Some(CompiledKind::Dispose),
        };

        if let Some(kind) = kind {
            stations.push(CompiledStation {
                id: StationId(index),
                name: station.name.clone(),
                kind,
            });
        }
    }

    check_targets(&stations, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    let model_hash = model_hash(config);
    debug!(
        model = %config.name,
        stations = stations.len(),
        hash = %model_hash,
        "model compiled"
    );

    Ok(CompiledModel {
        name: config.name.clone(),
        seed: config.seed,
        model_hash,
        stations,
        continuous: config.continuous.clone(),
        sensors,
        variables,
        limits: config.limits.clone(),
        statistics: config.statistics.clone(),
        record_events: config.record_events,
    })
}

/// Names that only exist on clients: initial values given by sources and
/// targets of client assignments and feeds
fn client_local_names(config: &ModelConfig) -> HashSet<String> {
    let mut names = HashSet::new();
    for station in &config.stations {
        match &station.kind {
            StationKind::Source { arrivals, .. } => {
                names.extend(arrivals.numbers.keys().map(|k| k.to_lowercase()));
                names.extend(arrivals.texts.keys().map(|k| k.to_lowercase()));
            }
            StationKind::Assign { assignments, .. } => {
                for assignment in assignments {
                    if let Some(name) = client_target(&assignment.target) {
                        names.insert(name);
                    }
                }
            }
            StationKind::Input { target, .. } => {
                if let Some(name) = client_target(target) {
                    names.insert(name);
                }
            }
            _ => {}
        }
    }
    names
}

fn client_target(target: &FeedTarget) -> Option<String> {
    match target {
        FeedTarget::ClientNumber(name) | FeedTarget::ClientText(name) => {
            Some(name.trim().to_lowercase()).filter(|n| !n.is_empty())
        }
        FeedTarget::Variable(_) => None,
    }
}

fn compile_sensors(
    config: &ModelConfig,
    entity_ids: &HashMap<String, usize>,
    errors: &mut Vec<ConfigError>,
) -> Vec<TankSensor> {
    let mut sensors = Vec::with_capacity(config.sensors.len());
    for sensor in &config.sensors {
        let problem =
            |message: String| ConfigError::model(format!("sensor '{}': {}", sensor.name, message));
        if sensor.name.trim().is_empty() {
            errors.push(ConfigError::model("sensor has no name"));
            continue;
        }
        if !sensor.threshold.is_finite() {
            errors.push(problem(format!("threshold {} is not finite", sensor.threshold)));
            continue;
        }
        let Some(&entity) = entity_ids.get(&sensor.entity.to_lowercase()) else {
            errors.push(problem(format!("unknown continuous entity '{}'", sensor.entity)));
            continue;
        };
        let threshold = if sensor.percent {
            match config.continuous[entity].kind {
                ContinuousKind::Tank { capacity } => capacity * sensor.threshold / 100.0,
                ContinuousKind::AnalogValue { .. } => {
                    errors.push(problem("percentage thresholds need a tank".to_string()));
                    continue;
                }
            }
        } else {
            sensor.threshold
        };
        sensors.push(TankSensor::new(
            sensor.name.trim(),
            entity,
            threshold,
            sensor.direction,
        ));
    }
    sensors
}

/// Hex SHA-256 of the configuration's JSON form
///
/// Map keys are already ordered (`BTreeMap`), so equal configurations give
/// equal hashes.
pub fn model_hash(config: &ModelConfig) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn check_limits(config: &ModelConfig, errors: &mut Vec<ConfigError>) {
    if let Some(end) = config.limits.end_time {
        if !(end > 0.0) || !end.is_finite() {
            errors.push(ConfigError::model(format!(
                "end time must be positive and finite, got {}",
                end
            )));
        }
    }
    if config.limits.max_events == Some(0) {
        errors.push(ConfigError::model("max_events must be at least 1"));
    }
    // Notify ticks reschedule themselves forever
    if !config.continuous.is_empty()
        && config.limits.end_time.is_none()
        && config.limits.max_events.is_none()
    {
        errors.push(ConfigError::model(
            "models with continuous entities need an end_time or max_events limit",
        ));
    }
    let stats = &config.statistics;
    if !(stats.data_upper_bound > 0.0) || stats.data_steps == 0 {
        errors.push(ConfigError::model(
            "statistics histogram needs a positive upper bound and at least one step",
        ));
    }
}

/// Sources only create clients; nothing may send clients to them
fn check_targets(stations: &[CompiledStation], errors: &mut Vec<ConfigError>) {
    let sources: HashSet<StationId> = stations
        .iter()
        .filter(|s| matches!(s.kind, CompiledKind::Source { .. }))
        .map(|s| s.id)
        .collect();

    for station in stations {
        let targets: Vec<StationId> = match &station.kind {
            CompiledKind::Decide { destinations, .. } => destinations.clone(),
            CompiledKind::Source { next, .. }
            | CompiledKind::Process { next, .. }
            | CompiledKind::Delay { next, .. }
            | CompiledKind::Assign { next, .. }
            | CompiledKind::Input { next, .. }
            | CompiledKind::Valve { next, .. }
            | CompiledKind::Flow { next, .. }
            | CompiledKind::Signal { next, .. } => vec![*next],
            CompiledKind::Dispose => Vec::new(),
        };
        for target in targets {
            if sources.contains(&target) {
                errors.push(ConfigError::station(
                    &station.name,
                    format!("cannot send clients to source station {}", target),
                ));
            }
        }
    }
}

/// Per-station helper that records errors under the station's name
struct StationCompiler<'a> {
    name: &'a str,
    ids: &'a HashMap<String, StationId>,
    errors: &'a mut Vec<ConfigError>,
}

impl StationCompiler<'_> {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(ConfigError::station(self.name, message));
    }

    fn resolve(&mut self, target: &str) -> Option<StationId> {
        let id = self.ids.get(&target.trim().to_lowercase()).copied();
        if id.is_none() {
            self.error(format!("unknown station '{}'", target));
        }
        id
    }

    fn distribution(&mut self, what: &str, distribution: &Distribution) {
        if let Err(message) = distribution.validate() {
            self.error(format!("{} time: {}", what, message));
        }
    }

    fn expression(&mut self, source: &str, symbols: &KnownSymbols) -> Option<Expression> {
        match check_with(source, symbols) {
            Ok(expression) => Some(expression),
            Err(e) => {
                let position = e.position();
                self.errors.push(
                    ConfigError::station(self.name, format!("'{}': {}", source, e)).at(position),
                );
                None
            }
        }
    }

    fn entity(&mut self, name: &str, entity_ids: &HashMap<String, usize>) -> Option<usize> {
        let index = entity_ids.get(&name.trim().to_lowercase()).copied();
        if index.is_none() {
            self.error(format!("unknown continuous entity '{}'", name));
        }
        index
    }

    fn flow(
        &mut self,
        config: &TankFlowConfig,
        entity_ids: &HashMap<String, usize>,
    ) -> Option<TankFlow> {
        let before = self.errors.len();
        let source = config
            .source
            .as_deref()
            .and_then(|name| self.entity(name, entity_ids));
        let destination = config
            .destination
            .as_deref()
            .and_then(|name| self.entity(name, entity_ids));

        if config.source.is_none() && config.destination.is_none() {
            self.error("flow needs a source or a destination");
        }
        if source.is_some() && source == destination {
            self.error("flow source and destination are the same entity");
        }
        if !(config.rate > 0.0) || !config.rate.is_finite() {
            self.error(format!("flow rate must be positive, got {}", config.rate));
        }
        if let Err(message) = config.stop.validate() {
            self.error(message);
        }

        (self.errors.len() == before).then(|| TankFlow {
            source,
            destination,
            rate_per_second: config.time_base.rate_per_second(config.rate),
            stop: config.stop.clone(),
        })
    }

    /// Global targets must be declared numeric variables
    fn target(&mut self, target: &FeedTarget, declared: &HashSet<String>) {
        if target.name().trim().is_empty() {
            self.error("assignment target has no name");
        } else if let FeedTarget::Variable(name) = target {
            if !declared.contains(&name.to_lowercase()) {
                self.error(format!("undeclared variable '{}'", name));
            }
        }
    }
}
