//! Run loop
//!
//! A [`Simulation`] owns everything that changes during one run: clock,
//! RNG, future event list, clients, variables, per-station run-time state
//! and the statistics being collected. The compiled model is shared and
//! never modified, so any number of runs can use the same one.
//!
//! # Event flow
//!
//! ```text
//! pop earliest event ──► advance clock ──► dispatch to owning station
//!                                              │
//!        ┌─────────────────────────────────────┘
//!        ▼
//! client moves on: pass-through stations (decide, assign, input, valve,
//! flow, signal) are handled immediately, until a station holds it
//! (process, delay) or removes it (dispose)
//! ```
//!
//! Simultaneous events fire in the order they were scheduled. Expression
//! failures at run time are recovered (assignment skipped, condition false)
//! and counted; only broken invariants end a run with
//! [`SimulationError::Fatal`].
//!
//! # Example
//!
//! ```rust
//! use queuesim_core_rs::orchestrator::{ModelConfig, Simulation, TerminationReason};
//!
//! let config: ModelConfig = serde_json::from_str(r#"{
//!     "stations": [
//!         {"name": "Door", "type": "source", "next": "Desk",
//!          "arrivals": {"client_type": "a", "max_arrivals": 3,
//!                       "inter_arrival": {"type": "fixed", "value": 10.0}}},
//!         {"name": "Desk", "type": "process", "next": "Exit",
//!          "service": {"type": "fixed", "value": 4.0}},
//!         {"name": "Exit", "type": "dispose"}
//!     ]
//! }"#).unwrap();
//!
//! let mut sim = Simulation::from_config(&config).unwrap();
//! let report = sim.run().unwrap();
//!
//! assert_eq!(report.termination, TerminationReason::NoMoreEvents);
//! assert_eq!(report.clients_disposed, 3);
//! assert_eq!(report.end_time, 34.0);
//! ```

use crate::arrivals::{ArrivalStream, Distribution};
use crate::continuous::{ActiveFlow, ContinuousState, DisplayCell, TankFlow, TankSensor};
use crate::core::time::SimClock;
use crate::events::{EventKind, EventQueue};
use crate::expression::{EvalContext, Expression, Value};
use crate::feed::{parse_number, FeedCursor, FeedRead, FeedTarget};
use crate::models::{Event, EventLog, StationId, SystemState, VariableEnvironment};
use crate::orchestrator::compile::{compile, CompiledAssignment, CompiledKind, CompiledModel, ConfigError};
use crate::orchestrator::config::ModelConfig;
use crate::orchestrator::report::RunReport;
use crate::orchestrator::stats::{ContinuousStatistics, RunStatistics, StationStatistics};
use crate::rng::RngManager;
use crate::routing::{LoadView, Router};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pass-through stations a client may visit within one instant before the
/// model is considered to loop
pub const MAX_TRANSIT_HOPS: usize = 1000;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative stop request, checked before every event
///
/// Clones share the flag, so one token can stop a whole batch of
/// replications.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Outcome and errors
// ============================================================================

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The configured end time was reached
    EndTime,
    /// The configured number of events was dispatched
    MaxEvents,
    /// The future event list ran empty
    NoMoreEvents,
    /// An input station with the terminate policy ran out of rows
    FeedTerminated { station: String },
    /// A [`CancelToken`] was triggered
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::EndTime => write!(f, "end time reached"),
            TerminationReason::MaxEvents => write!(f, "event limit reached"),
            TerminationReason::NoMoreEvents => write!(f, "no more events"),
            TerminationReason::FeedTerminated { station } => {
                write!(f, "input station '{}' ran out of data", station)
            }
            TerminationReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of a single [`Simulation::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Dispatched { time: f64, event: &'static str },
    Finished(TerminationReason),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid model ({} problem(s)): {}", .0.len(), join_errors(.0))]
    InvalidModel(Vec<ConfigError>),

    #[error("fatal error at '{station}' (t={time}, {event}): {message}")]
    Fatal {
        station: String,
        time: f64,
        event: String,
        message: String,
    },
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn fatal(station: &str, time: f64, event: &str, message: impl fmt::Display) -> SimulationError {
    SimulationError::Fatal {
        station: station.to_string(),
        time,
        event: event.to_string(),
        message: message.to_string(),
    }
}

// ============================================================================
// Run-time state
// ============================================================================

/// Mutable state of one station during a run
#[derive(Debug, Default)]
struct StationRuntime {
    arrivals: Option<ArrivalStream>,
    router: Option<Router>,
    feed: Option<FeedCursor>,
    /// Clients waiting for a server, in arrival order
    queue: VecDeque<u64>,
    busy: usize,
}

/// Station load for load-based routing, read from the live state
struct ModelLoad<'a> {
    model: &'a CompiledModel,
    state: &'a SystemState,
}

impl LoadView for ModelLoad<'_> {
    fn queue_length(&self, station: StationId) -> usize {
        self.state.occupancy(station.index()).waiting
    }

    fn client_count(&self, station: StationId) -> usize {
        self.state.occupancy(station.index()).in_station
    }

    fn pass_through_successor(&self, station: StationId) -> Option<StationId> {
        self.model
            .station(station)
            .and_then(|s| s.kind.pass_through_successor())
    }
}

/// One run of a compiled model
pub struct Simulation {
    model: Arc<CompiledModel>,
    seed: u64,
    clock: SimClock,
    rng: RngManager,
    events: EventQueue,
    state: SystemState,
    variables: VariableEnvironment,
    stations: Vec<StationRuntime>,
    continuous: Vec<ContinuousState>,
    displays: Vec<Arc<DisplayCell>>,
    /// Running transfers with the flow station that started them
    flows: Vec<(StationId, ActiveFlow)>,
    sensors: Vec<TankSensor>,
    stats: RunStatistics,
    log: EventLog,
    events_processed: u64,
    cancel: CancelToken,
    termination: Option<TerminationReason>,
}

impl Simulation {
    /// Prepare a run: open feeds, start continuous entities and schedule
    /// the first arrival of every source
    pub fn new(model: Arc<CompiledModel>, seed: u64) -> Result<Self, SimulationError> {
        let settings = &model.statistics;
        let mut stats = RunStatistics::new(settings);
        let mut stations = Vec::with_capacity(model.stations.len());

        for station in &model.stations {
            let mut runtime = StationRuntime::default();
            let mut station_stats =
                StationStatistics::new(&station.name, station.kind.type_name(), settings);

            match &station.kind {
                CompiledKind::Source { arrivals, .. } => {
                    runtime.arrivals = Some(ArrivalStream::new(arrivals.clone()));
                }
                CompiledKind::Decide {
                    destinations,
                    policy,
                    tie_break,
                    ..
                } => {
                    let router = Router::new(destinations.clone(), policy.clone(), *tie_break)
                        .map_err(|e| fatal(&station.name, 0.0, "start", e))?;
                    station_stats.routing = Some(vec![0; destinations.len()]);
                    runtime.router = Some(router);
                }
                CompiledKind::Input {
                    source, settings, ..
                } => {
                    let cursor = FeedCursor::open(source.as_source(), settings.clone());
                    if let Some(e) = cursor.open_error() {
                        warn!(
                            station = %station.name,
                            source = %source.as_source().describe(),
                            error = %e,
                            eof = ?settings.eof,
                            "feed source unavailable, treating it as exhausted"
                        );
                    } else {
                        debug!(station = %station.name, rows = cursor.len(), "feed opened");
                    }
                    runtime.feed = Some(cursor);
                }
                _ => {}
            }

            stations.push(runtime);
            stats.stations.push(station_stats);
        }

        let mut variables = model.variables.clone();
        let mut continuous = Vec::with_capacity(model.continuous.len());
        let mut displays = Vec::with_capacity(model.continuous.len());
        for config in &model.continuous {
            let mut entity =
                ContinuousState::new(config).map_err(|e| fatal(&config.name, 0.0, "start", e))?;
            let cell = DisplayCell::shared(entity.value());
            entity.attach_display(Arc::clone(&cell));
            variables.set_number(&config.name, entity.value());
            stats
                .continuous
                .push(ContinuousStatistics::new(&config.name, entity.value(), settings));
            continuous.push(entity);
            displays.push(cell);
        }

        let mut sensors = model.sensors.clone();
        for sensor in &mut sensors {
            if let Some(entity) = continuous.get(sensor.entity()) {
                sensor.observe(entity.value());
            }
        }

        let state = SystemState::new(&model.station_names());
        let mut sim = Self {
            model: Arc::clone(&model),
            seed,
            clock: SimClock::new(),
            rng: RngManager::new(seed),
            events: EventQueue::new(),
            state,
            variables,
            stations,
            continuous,
            displays,
            flows: Vec::new(),
            sensors,
            stats,
            log: EventLog::new(),
            events_processed: 0,
            cancel: CancelToken::new(),
            termination: None,
        };
        sim.schedule_start()?;
        Ok(sim)
    }

    /// Compile a configuration and prepare a run with its seed
    pub fn from_config(config: &ModelConfig) -> Result<Self, SimulationError> {
        let model = compile(config).map_err(SimulationError::InvalidModel)?;
        Self::new(Arc::new(model), config.seed)
    }

    /// Use a shared cancellation token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    fn schedule_start(&mut self) -> Result<(), SimulationError> {
        for (index, runtime) in self.stations.iter_mut().enumerate() {
            if let Some(stream) = runtime.arrivals.as_mut() {
                if let Some(gap) = stream.next_gap(&mut self.rng) {
                    self.events.schedule(
                        gap,
                        EventKind::Arrival {
                            source: StationId(index),
                        },
                    );
                }
            }
        }
        for (entity, state) in self.continuous.iter_mut().enumerate() {
            state
                .start(0.0)
                .map_err(|e| fatal(state.name(), 0.0, "start", e))?;
            self.events
                .schedule(state.notify_interval(), EventKind::AnalogNotify { entity });
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn variables(&self) -> &VariableEnvironment {
        &self.variables
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn into_statistics(self) -> RunStatistics {
        self.stats
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current value of a tank or analog value
    pub fn continuous_value(&self, name: &str) -> Option<f64> {
        self.continuous
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(|c| c.value())
    }

    /// Display cell of a tank or analog value, for a render thread
    pub fn display(&self, name: &str) -> Option<Arc<DisplayCell>> {
        self.continuous
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
            .map(|i| Arc::clone(&self.displays[i]))
    }

    /// Recovered evaluation failures so far, over all stations
    pub fn evaluation_errors(&self) -> u64 {
        self.stats.evaluation_errors()
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Run until a termination condition holds
    pub fn run(&mut self) -> Result<RunReport, SimulationError> {
        info!(
            model = %self.model.name,
            seed = self.seed,
            stations = self.model.stations.len(),
            "run started"
        );
        loop {
            if let StepOutcome::Finished(reason) = self.step()? {
                info!(
                    model = %self.model.name,
                    time = self.now(),
                    events = self.events_processed,
                    reason = %reason,
                    "run finished"
                );
                return Ok(self.report());
            }
        }
    }

    /// Dispatch one event
    ///
    /// Once the run has finished every further call returns the same
    /// [`StepOutcome::Finished`].
    pub fn step(&mut self) -> Result<StepOutcome, SimulationError> {
        if let Some(reason) = &self.termination {
            return Ok(StepOutcome::Finished(reason.clone()));
        }
        if self.cancel.is_cancelled() {
            return Ok(self.terminate(TerminationReason::Cancelled));
        }
        if let Some(max) = self.model.limits.max_events {
            if self.events_processed >= max {
                return Ok(self.terminate(TerminationReason::MaxEvents));
            }
        }

        let next_time = match self.events.peek_time() {
            Some(time) => time,
            None => return Ok(self.terminate(TerminationReason::NoMoreEvents)),
        };
        if let Some(end) = self.model.limits.end_time {
            if next_time > end {
                self.clock.advance_to(end);
                return Ok(self.terminate(TerminationReason::EndTime));
            }
        }

        let event = match self.events.pop() {
            Some(event) => event,
            None => return Ok(self.terminate(TerminationReason::NoMoreEvents)),
        };
        self.clock.advance_to(event.time);
        self.events_processed += 1;
        debug!(
            time = event.time,
            event = event.kind.name(),
            station = ?event.kind.station(),
            "dispatch"
        );

        self.dispatch(event.kind)?;

        match &self.termination {
            Some(reason) => Ok(StepOutcome::Finished(reason.clone())),
            None => Ok(StepOutcome::Dispatched {
                time: event.time,
                event: event.kind.name(),
            }),
        }
    }

    /// Build the report for the current state of the run
    pub fn report(&self) -> RunReport {
        RunReport::build(self)
    }

    fn dispatch(&mut self, kind: EventKind) -> Result<(), SimulationError> {
        match kind {
            EventKind::Arrival { source } => self.on_arrival(source),
            EventKind::ServiceDone { station, client } => self.on_service_done(station, client),
            EventKind::DelayDone { station, client } => self.on_delay_done(station, client),
            EventKind::AnalogNotify { entity } => self.on_notify(entity),
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> StepOutcome {
        let now = self.clock.now();
        if let Err(e) = self.advance_flows() {
            warn!(error = %e, "final flow update failed");
        }
        for entity in 0..self.continuous.len() {
            if let Err(e) = self.tick_entity(entity) {
                warn!(error = %e, "final continuous update failed");
            }
        }
        for entity in &mut self.continuous {
            entity.terminate();
        }
        for runtime in &mut self.stations {
            if let Some(feed) = runtime.feed.as_mut() {
                feed.close();
            }
        }
        self.stats.close(now);
        self.record(Event::RunTerminated {
            time: now,
            reason: reason.to_string(),
        });
        self.termination = Some(reason.clone());
        StepOutcome::Finished(reason)
    }

    fn record(&mut self, event: Event) {
        if self.model.record_events {
            self.log.log(event);
        }
    }

    fn station_name(&self, station: StationId) -> String {
        self.model
            .station(station)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| station.to_string())
    }

    fn missing_client(&self, station: StationId, event: &str, client: u64) -> SimulationError {
        fatal(
            &self.station_name(station),
            self.now(),
            event,
            format!("client {} is not in the system", client),
        )
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    fn on_arrival(&mut self, source: StationId) -> Result<(), SimulationError> {
        let now = self.now();
        let model = Arc::clone(&self.model);
        let next = match model.station(source).map(|s| &s.kind) {
            Some(CompiledKind::Source { next, .. }) => *next,
            _ => {
                return Err(fatal(
                    &self.station_name(source),
                    now,
                    "arrival",
                    "arrival scheduled for a station that is not a source",
                ))
            }
        };

        let id = self.state.allocate_client_id();
        let stream = match self.stations[source.index()].arrivals.as_mut() {
            Some(stream) => stream,
            None => {
                return Err(fatal(
                    &model.stations[source.index()].name,
                    now,
                    "arrival",
                    "source has no arrival stream",
                ))
            }
        };
        let client = stream.create_client(id, now);
        if let Some(gap) = stream.next_gap(&mut self.rng) {
            self.events.schedule(now + gap, EventKind::Arrival { source });
        }

        self.record(Event::Arrival {
            time: now,
            client_id: id,
            client_type: client.client_type().to_string(),
            station: model.stations[source.index()].name.clone(),
        });
        self.stats.clients_created += 1;
        self.stats.stations[source.index()].arrivals += 1;
        self.state.insert_client(client);
        self.stats.wip.set(now, self.state.num_clients() as f64);

        self.forward(id, next)
    }

    fn on_service_done(&mut self, station: StationId, client: u64) -> Result<(), SimulationError> {
        let now = self.now();
        let model = Arc::clone(&self.model);
        let (service, next) = match model.station(station).map(|s| &s.kind) {
            Some(CompiledKind::Process { service, next, .. }) => (service, *next),
            _ => {
                return Err(fatal(
                    &self.station_name(station),
                    now,
                    "service_done",
                    "service completion at a station that is not a process station",
                ))
            }
        };

        self.leave_station(station, client, "service_done")?;
        self.record(Event::ServiceEnd {
            time: now,
            client_id: client,
            station: model.stations[station.index()].name.clone(),
        });

        let i = station.index();
        match self.stations[i].queue.pop_front() {
            Some(waiting) => {
                self.state.stop_waiting(i);
                let waiting_now = self.state.occupancy(i).waiting as f64;
                self.stats.stations[i].queue_length.set(now, waiting_now);
                let waited = self
                    .state
                    .client(waiting)
                    .map(|c| now - c.station_enter_time())
                    .ok_or_else(|| self.missing_client(station, "service_done", waiting))?;
                self.start_service(waiting, station, service, waited);
            }
            None => {
                let runtime = &mut self.stations[i];
                runtime.busy = runtime.busy.saturating_sub(1);
            }
        }

        self.forward(client, next)
    }

    fn on_delay_done(&mut self, station: StationId, client: u64) -> Result<(), SimulationError> {
        let next = match self.model.station(station).map(|s| &s.kind) {
            Some(CompiledKind::Delay { next, .. }) => *next,
            _ => {
                return Err(fatal(
                    &self.station_name(station),
                    self.now(),
                    "delay_done",
                    "delay completion at a station that is not a delay station",
                ))
            }
        };
        self.leave_station(station, client, "delay_done")?;
        self.forward(client, next)
    }

    fn on_notify(&mut self, entity: usize) -> Result<(), SimulationError> {
        self.advance_flows()?;
        self.tick_entity(entity)?;
        let interval = self.continuous[entity].notify_interval();
        self.events
            .schedule(self.now() + interval, EventKind::AnalogNotify { entity });
        Ok(())
    }

    // ========================================================================
    // Client movement
    // ========================================================================

    /// Move a client to `target` and on through pass-through stations
    fn forward(&mut self, client: u64, target: StationId) -> Result<(), SimulationError> {
        let model = Arc::clone(&self.model);
        let mut station = target;

        for _ in 0..MAX_TRANSIT_HOPS {
            let compiled = model.station(station).ok_or_else(|| {
                fatal(
                    &station.to_string(),
                    self.now(),
                    "transit",
                    "no such station",
                )
            })?;
            self.stats.stations[station.index()].arrivals += 1;

            match &compiled.kind {
                CompiledKind::Process {
                    servers, service, ..
                } => {
                    self.enter_process(client, station, *servers, service)?;
                    return Ok(());
                }
                CompiledKind::Delay { delay, .. } => {
                    self.enter_delay(client, station, delay)?;
                    return Ok(());
                }
                CompiledKind::Dispose => {
                    return self.dispose(client, station);
                }
                CompiledKind::Decide {
                    destinations,
                    new_client_types,
                    ..
                } => {
                    let index = self.route(client, station)?;
                    let destination = destinations[index];
                    self.record(Event::Routed {
                        time: self.now(),
                        client_id: client,
                        station: compiled.name.clone(),
                        destination_index: index,
                        destination: model.stations[destination.index()].name.clone(),
                    });
                    let new_type = new_client_types.get(index).and_then(Option::as_deref);
                    if let Some(client_type) = new_type {
                        self.change_client_type(client, station, client_type)?;
                    }
                    station = destination;
                }
                CompiledKind::Assign { assignments, next } => {
                    self.assign(client, station, assignments);
                    station = *next;
                }
                CompiledKind::Input { target, next, .. } => {
                    if !self.read_feed(client, station, target) {
                        return Ok(());
                    }
                    station = *next;
                }
                CompiledKind::Valve {
                    entity,
                    valve,
                    flow_rate,
                    next,
                } => {
                    self.set_valve(client, station, *entity, *valve, flow_rate)?;
                    station = *next;
                }
                CompiledKind::Flow { flow, next } => {
                    self.start_flow(station, flow)?;
                    station = *next;
                }
                CompiledKind::Signal { signal, next } => {
                    self.raise_signal(signal, &compiled.name)?;
                    station = *next;
                }
                CompiledKind::Source { .. } => {
                    return Err(fatal(
                        &compiled.name,
                        self.now(),
                        "transit",
                        format!("client {} routed into a source station", client),
                    ));
                }
            }
        }

        Err(fatal(
            &self.station_name(station),
            self.now(),
            "transit",
            format!(
                "client {} passed {} stations without being held; the model loops",
                client, MAX_TRANSIT_HOPS
            ),
        ))
    }

    fn enter_station(&mut self, client: u64, station: StationId) -> Result<(), SimulationError> {
        let now = self.now();
        let i = station.index();
        match self.state.client_mut(client) {
            Some(c) => c.enter_station(now),
            None => return Err(self.missing_client(station, "enter", client)),
        }
        self.state.enter(i);
        let in_station = self.state.occupancy(i).in_station as f64;
        self.stats.stations[i].clients.set(now, in_station);
        Ok(())
    }

    fn leave_station(
        &mut self,
        station: StationId,
        client: u64,
        event: &str,
    ) -> Result<(), SimulationError> {
        let now = self.now();
        let i = station.index();
        let entered = self
            .state
            .client(client)
            .map(|c| c.station_enter_time())
            .ok_or_else(|| self.missing_client(station, event, client))?;
        self.stats.stations[i].residence_time.record(now - entered);
        self.state.leave(i);
        let in_station = self.state.occupancy(i).in_station as f64;
        self.stats.stations[i].clients.set(now, in_station);
        Ok(())
    }

    fn enter_process(
        &mut self,
        client: u64,
        station: StationId,
        servers: usize,
        service: &Distribution,
    ) -> Result<(), SimulationError> {
        self.enter_station(client, station)?;
        let i = station.index();
        if self.stations[i].busy < servers {
            self.stations[i].busy += 1;
            self.start_service(client, station, service, 0.0);
        } else {
            self.stations[i].queue.push_back(client);
            self.state.start_waiting(i);
            let waiting = self.state.occupancy(i).waiting as f64;
            let now = self.now();
            self.stats.stations[i].queue_length.set(now, waiting);
        }
        Ok(())
    }

    fn start_service(
        &mut self,
        client: u64,
        station: StationId,
        service: &Distribution,
        waited: f64,
    ) {
        let now = self.now();
        let i = station.index();
        let duration = service.sample(&mut self.rng);
        self.stats.stations[i].waiting_time.record(waited);
        self.stats.stations[i].service_time.record(duration);
        self.record(Event::ServiceStart {
            time: now,
            client_id: client,
            station: self.model.stations[i].name.clone(),
            waiting_time: waited,
        });
        self.events
            .schedule(now + duration, EventKind::ServiceDone { station, client });
    }

    fn enter_delay(
        &mut self,
        client: u64,
        station: StationId,
        delay: &Distribution,
    ) -> Result<(), SimulationError> {
        self.enter_station(client, station)?;
        let duration = delay.sample(&mut self.rng);
        self.stats.stations[station.index()]
            .service_time
            .record(duration);
        self.events
            .schedule(self.now() + duration, EventKind::DelayDone { station, client });
        Ok(())
    }

    fn dispose(&mut self, client: u64, station: StationId) -> Result<(), SimulationError> {
        let now = self.now();
        let removed = self
            .state
            .remove_client(client)
            .ok_or_else(|| self.missing_client(station, "dispose", client))?;
        let time_in_system = removed.time_in_system(now);
        self.stats.time_in_system.record(time_in_system);
        self.stats.clients_disposed += 1;
        self.stats.wip.set(now, self.state.num_clients() as f64);
        self.record(Event::Disposed {
            time: now,
            client_id: client,
            station: self.model.stations[station.index()].name.clone(),
            time_in_system,
        });
        Ok(())
    }

    // ========================================================================
    // Pass-through stations
    // ========================================================================

    fn route(&mut self, client: u64, station: StationId) -> Result<usize, SimulationError> {
        let now = self.clock.now();
        let i = station.index();
        let Simulation {
            model,
            stations,
            state,
            variables,
            rng,
            stats,
            ..
        } = self;

        let name = &model.stations[i].name;
        let router = stations[i]
            .router
            .as_mut()
            .ok_or_else(|| fatal(name, now, "route", "decide station has no router"))?;
        let current = state
            .client(client)
            .ok_or_else(|| fatal(name, now, "route", format!("client {} is not in the system", client)))?;

        let ctx = EvalContext::new(variables, &*state, now).with_client(current);
        let load = ModelLoad {
            model: &**model,
            state: &*state,
        };
        let errors_before = router.evaluation_errors();
        let decision = router.decide(current, &ctx, &load, rng);
        stats.stations[i].evaluation_errors += router.evaluation_errors() - errors_before;

        let index = decision.map_err(|e| fatal(name, now, "route", e))?;
        if let Some(counts) = stats.stations[i].routing.as_mut() {
            counts[index] += 1;
        }
        Ok(index)
    }

    fn assign(&mut self, client: u64, station: StationId, assignments: &[CompiledAssignment]) {
        for assignment in assignments {
            let result = self.evaluate(client, &assignment.expression);
            let outcome = result.and_then(|value| self.write_value(client, &assignment.target, value));
            match outcome {
                Ok(written) => self.record(Event::VariableAssigned {
                    time: self.now(),
                    station: self.model.stations[station.index()].name.clone(),
                    target: assignment.target.name().to_string(),
                    value: written,
                }),
                Err(message) => {
                    self.evaluation_failed(station, assignment.expression.source(), &message)
                }
            }
        }
    }

    /// Read the next feed value; `false` when the run was terminated
    fn read_feed(&mut self, client: u64, station: StationId, target: &FeedTarget) -> bool {
        let now = self.now();
        let i = station.index();
        let (read, newly_exhausted) = match self.stations[i].feed.as_mut() {
            Some(feed) => {
                let was_exhausted = feed.is_exhausted();
                let read = feed.next();
                (read, !was_exhausted && feed.is_exhausted())
            }
            None => (FeedRead::Skip, false),
        };
        let name = self.model.stations[i].name.clone();

        if newly_exhausted {
            debug!(station = %name, time = now, "feed exhausted");
            self.record(Event::FeedExhausted {
                time: now,
                station: name.clone(),
            });
        }

        match read {
            FeedRead::Value(raw) => {
                let value = if target.is_numeric() {
                    match parse_number(&raw) {
                        Ok(n) => Value::Number(n),
                        Err(e) => {
                            self.evaluation_failed(station, &raw, &e.to_string());
                            return true;
                        }
                    }
                } else {
                    Value::Text(raw)
                };
                match self.write_value(client, target, value) {
                    Ok(written) => self.record(Event::VariableAssigned {
                        time: now,
                        station: name,
                        target: target.name().to_string(),
                        value: written,
                    }),
                    Err(message) => self.evaluation_failed(station, target.name(), &message),
                }
                true
            }
            FeedRead::Skip => {
                self.record(Event::FeedSkipped {
                    time: now,
                    station: name,
                });
                true
            }
            FeedRead::Terminate => {
                self.terminate(TerminationReason::FeedTerminated { station: name });
                false
            }
        }
    }

    fn set_valve(
        &mut self,
        client: u64,
        station: StationId,
        entity: usize,
        valve: usize,
        flow_rate: &Expression,
    ) -> Result<(), SimulationError> {
        let rate = match self
            .evaluate(client, flow_rate)
            .and_then(|v| v.as_number().map_err(|e| e.to_string()))
        {
            Ok(rate) => rate,
            Err(message) => {
                self.evaluation_failed(station, flow_rate.source(), &message);
                return Ok(());
            }
        };

        // Integrate with the old rate up to now first
        self.advance_flows()?;
        self.tick_entity(entity)?;
        if let Err(e) = self.continuous[entity].set_valve_flow(valve, rate) {
            self.evaluation_failed(station, flow_rate.source(), &e.to_string());
        }
        Ok(())
    }

    fn tick_entity(&mut self, entity: usize) -> Result<(), SimulationError> {
        let now = self.now();
        let state = &mut self.continuous[entity];
        let changed = state
            .tick(now)
            .map_err(|e| fatal(state.name(), now, "analog_notify", e))?;
        let value = state.value();
        let name = state.name().to_string();

        let entity_stats = &mut self.stats.continuous[entity];
        entity_stats.level.set(now, value);
        entity_stats.final_value = value;
        if changed.is_some() {
            entity_stats.notifications += 1;
            self.record(Event::AnalogNotify {
                time: now,
                entity: name.clone(),
                value,
            });
        }
        self.variables.set_number(&name, value);

        let fired: Vec<String> = self
            .sensors
            .iter_mut()
            .filter(|sensor| sensor.entity() == entity)
            .filter_map(|sensor| sensor.observe(value).then(|| sensor.name().to_string()))
            .collect();
        for signal in fired {
            debug!(entity = %name, signal = %signal, time = now, value, "sensor threshold crossed");
            self.raise_signal(&signal, &name)?;
        }
        Ok(())
    }

    // ========================================================================
    // Flows and signals
    // ========================================================================

    fn start_flow(&mut self, station: StationId, flow: &TankFlow) -> Result<(), SimulationError> {
        let now = self.now();
        // Running flows settle at the old state before the new one joins
        self.advance_flows()?;
        let entity_name = |index: Option<usize>| {
            index
                .and_then(|i| self.continuous.get(i))
                .map(|c| c.name().to_string())
        };
        let event = Event::FlowStarted {
            time: now,
            station: self.model.stations[station.index()].name.clone(),
            source: entity_name(flow.source),
            destination: entity_name(flow.destination),
        };
        self.record(event);
        self.flows.push((station, ActiveFlow::start(flow.clone(), now)));
        Ok(())
    }

    /// Move material of every running flow up to now and drop finished ones
    fn advance_flows(&mut self) -> Result<(), SimulationError> {
        if self.flows.is_empty() {
            return Ok(());
        }
        let now = self.now();
        for index in 0..self.flows.len() {
            let (station, flow) = &mut self.flows[index];
            let ends = [flow.flow().source, flow.flow().destination];
            for entity in ends.into_iter().flatten() {
                let state = &mut self.continuous[entity];
                state
                    .advance(now)
                    .map_err(|e| fatal(state.name(), now, "flow", e))?;
            }
            let moved = flow
                .advance(now, &mut self.continuous)
                .map_err(|e| fatal(&self.model.stations[station.index()].name, now, "flow", e))?;
            if moved > 0.0 {
                let flow = flow.flow();
                if let Some(source) = flow.source {
                    self.stats.continuous[source].flow_out += moved;
                }
                if let Some(destination) = flow.destination {
                    self.stats.continuous[destination].flow_in += moved;
                }
            }
        }
        self.finish_flows(|flow| flow.is_finished());
        Ok(())
    }

    /// Remove the flows matching `done`, logging each
    fn finish_flows(&mut self, done: impl Fn(&ActiveFlow) -> bool) {
        let now = self.now();
        let (finished, running): (Vec<_>, Vec<_>) =
            self.flows.drain(..).partition(|(_, flow)| done(flow));
        self.flows = running;
        for (station, flow) in finished {
            let name = self.model.stations[station.index()].name.clone();
            debug!(station = %name, time = now, moved = flow.moved(), "flow finished");
            self.record(Event::FlowFinished {
                time: now,
                station: name,
                quantity: flow.moved(),
            });
        }
    }

    /// Stop the flows waiting for `signal`
    fn raise_signal(&mut self, signal: &str, origin: &str) -> Result<(), SimulationError> {
        let now = self.now();
        self.advance_flows()?;
        self.record(Event::SignalRaised {
            time: now,
            signal: signal.to_string(),
            origin: origin.to_string(),
        });
        self.finish_flows(|flow| flow.flow().stop.stops_on(signal));
        Ok(())
    }

    fn change_client_type(
        &mut self,
        client: u64,
        station: StationId,
        client_type: &str,
    ) -> Result<(), SimulationError> {
        let now = self.now();
        match self.state.client_mut(client) {
            Some(c) => c.set_client_type(client_type),
            None => return Err(self.missing_client(station, "route", client)),
        }
        self.record(Event::ClientTypeChanged {
            time: now,
            client_id: client,
            station: self.model.stations[station.index()].name.clone(),
            client_type: client_type.to_string(),
        });
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn evaluate(&self, client: u64, expression: &Expression) -> Result<Value, String> {
        let mut ctx = EvalContext::new(&self.variables, &self.state, self.now());
        if let Some(c) = self.state.client(client) {
            ctx = ctx.with_client(c);
        }
        expression.evaluate(&ctx).map_err(|e| e.to_string())
    }

    /// Store a value; returns its text form for the event log
    fn write_value(&mut self, client: u64, target: &FeedTarget, value: Value) -> Result<String, String> {
        let text = value.to_string();
        match target {
            FeedTarget::Variable(name) => {
                let n = value.as_number().map_err(|e| e.to_string())?;
                self.variables.set_number(name, n);
            }
            FeedTarget::ClientNumber(key) => {
                let n = value.as_number().map_err(|e| e.to_string())?;
                let c = self
                    .state
                    .client_mut(client)
                    .ok_or_else(|| format!("client {} is not in the system", client))?;
                c.set_number(key, n);
            }
            FeedTarget::ClientText(key) => {
                let c = self
                    .state
                    .client_mut(client)
                    .ok_or_else(|| format!("client {} is not in the system", client))?;
                c.set_text(key, text.clone());
            }
        }
        Ok(text)
    }

    fn evaluation_failed(&mut self, station: StationId, expression: &str, message: &str) {
        let now = self.now();
        let i = station.index();
        let name = self.model.stations[i].name.clone();
        self.stats.stations[i].evaluation_errors += 1;
        warn!(station = %name, time = now, expression, error = message, "evaluation failed");
        self.record(Event::EvaluationFailed {
            time: now,
            station: name,
            expression: expression.to_string(),
            message: message.to_string(),
        });
    }
}
