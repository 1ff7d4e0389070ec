//! Event logging for run replay and diagnosis.
//!
//! This module defines the Event enum which captures every significant state
//! change during a run. The log is only filled when the model enables
//! `record_events`; statistics never depend on it.
//!
//! # Event Types
//!
//! - **Flow**: client arrival, routing, service start/end, disposal
//! - **Data**: variable assignment, feed reads and feed exhaustion
//! - **Continuous**: analog notify ticks that changed a tank/analog value,
//!   flows between tanks, raised signals
//! - **Diagnostics**: recovered evaluation failures, run termination
//!
//! # Example
//!
//! ```rust
//! use queuesim_core_rs::models::Event;
//!
//! let event = Event::Arrival {
//!     time: 1.5,
//!     client_id: 42,
//!     client_type: "standard".to_string(),
//!     station: "Source".to_string(),
//! };
//!
//! assert_eq!(event.time(), 1.5);
//! assert_eq!(event.event_type(), "Arrival");
//! ```

use serde::Serialize;

/// Run event capturing a state change.
///
/// All events carry the simulated time at which they happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Client created by a source station
    Arrival {
        time: f64,
        client_id: u64,
        client_type: String,
        station: String,
    },

    /// Decide station sent a client to one of its destinations
    Routed {
        time: f64,
        client_id: u64,
        station: String,
        destination_index: usize,
        destination: String,
    },

    /// Client entered service at a process station
    ServiceStart {
        time: f64,
        client_id: u64,
        station: String,
        waiting_time: f64,
    },

    /// Client finished service at a process station
    ServiceEnd {
        time: f64,
        client_id: u64,
        station: String,
    },

    /// Decide station gave a client a new type on its way out
    ClientTypeChanged {
        time: f64,
        client_id: u64,
        station: String,
        client_type: String,
    },

    /// Client left the system
    Disposed {
        time: f64,
        client_id: u64,
        station: String,
        time_in_system: f64,
    },

    /// Assignment or feed station wrote a value
    VariableAssigned {
        time: f64,
        station: String,
        target: String,
        value: String,
    },

    /// Feed produced no value for this read (skip policy)
    FeedSkipped { time: f64, station: String },

    /// Feed ran out of rows for the first time
    FeedExhausted { time: f64, station: String },

    /// Continuous entity value changed by more than the notify epsilon
    AnalogNotify {
        time: f64,
        entity: String,
        value: f64,
    },

    /// Flow station started a transfer; `None` ends are the environment
    FlowStarted {
        time: f64,
        station: String,
        source: Option<String>,
        destination: Option<String>,
    },

    /// Transfer reached its stop condition or its signal
    FlowFinished {
        time: f64,
        station: String,
        quantity: f64,
    },

    /// Sensor or signal station raised a signal
    SignalRaised {
        time: f64,
        signal: String,
        origin: String,
    },

    /// Expression failed at run time and was recovered from
    EvaluationFailed {
        time: f64,
        station: String,
        expression: String,
        message: String,
    },

    /// Run stopped
    RunTerminated { time: f64, reason: String },
}

impl Event {
    /// Simulated time at which this event occurred
    pub fn time(&self) -> f64 {
        match self {
            Event::Arrival { time, .. } => *time,
            Event::Routed { time, .. } => *time,
            Event::ServiceStart { time, .. } => *time,
            Event::ServiceEnd { time, .. } => *time,
            Event::ClientTypeChanged { time, .. } => *time,
            Event::Disposed { time, .. } => *time,
            Event::VariableAssigned { time, .. } => *time,
            Event::FeedSkipped { time, .. } => *time,
            Event::FeedExhausted { time, .. } => *time,
            Event::AnalogNotify { time, .. } => *time,
            Event::FlowStarted { time, .. } => *time,
            Event::FlowFinished { time, .. } => *time,
            Event::SignalRaised { time, .. } => *time,
            Event::EvaluationFailed { time, .. } => *time,
            Event::RunTerminated { time, .. } => *time,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Arrival { .. } => "Arrival",
            Event::Routed { .. } => "Routed",
            Event::ServiceStart { .. } => "ServiceStart",
            Event::ServiceEnd { .. } => "ServiceEnd",
            Event::ClientTypeChanged { .. } => "ClientTypeChanged",
            Event::Disposed { .. } => "Disposed",
            Event::VariableAssigned { .. } => "VariableAssigned",
            Event::FeedSkipped { .. } => "FeedSkipped",
            Event::FeedExhausted { .. } => "FeedExhausted",
            Event::AnalogNotify { .. } => "AnalogNotify",
            Event::FlowStarted { .. } => "FlowStarted",
            Event::FlowFinished { .. } => "FlowFinished",
            Event::SignalRaised { .. } => "SignalRaised",
            Event::EvaluationFailed { .. } => "EvaluationFailed",
            Event::RunTerminated { .. } => "RunTerminated",
        }
    }

    /// Client id if the event concerns a specific client
    pub fn client_id(&self) -> Option<u64> {
        match self {
            Event::Arrival { client_id, .. }
            | Event::Routed { client_id, .. }
            | Event::ServiceStart { client_id, .. }
            | Event::ServiceEnd { client_id, .. }
            | Event::ClientTypeChanged { client_id, .. }
            | Event::Disposed { client_id, .. } => Some(*client_id),
            _ => None,
        }
    }

    /// Station (or continuous entity) name if the event concerns one
    pub fn station(&self) -> Option<&str> {
        match self {
            Event::Arrival { station, .. }
            | Event::Routed { station, .. }
            | Event::ServiceStart { station, .. }
            | Event::ServiceEnd { station, .. }
            | Event::ClientTypeChanged { station, .. }
            | Event::Disposed { station, .. }
            | Event::FlowStarted { station, .. }
            | Event::FlowFinished { station, .. }
            | Event::VariableAssigned { station, .. }
            | Event::FeedSkipped { station, .. }
            | Event::FeedExhausted { station, .. }
            | Event::EvaluationFailed { station, .. } => Some(station),
            Event::AnalogNotify { entity, .. } => Some(entity),
            Event::SignalRaised { origin, .. } => Some(origin),
            Event::RunTerminated { .. } => None,
        }
    }
}

/// Event log for storing and querying run events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific client
    pub fn events_for_client(&self, client_id: u64) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.client_id() == Some(client_id))
            .collect()
    }

    /// Get events for a specific station, compared case-insensitively
    pub fn events_for_station(&self, station: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.station().is_some_and(|s| s.eq_ignore_ascii_case(station)))
            .collect()
    }
}
