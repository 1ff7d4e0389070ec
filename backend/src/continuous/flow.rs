//! Transfers between continuous entities
//!
//! A flow moves material out of one tank (or out of the environment, when
//! it has no source) into another tank (or into the environment) at a fixed
//! rate until its stop condition holds:
//!
//! ```text
//! moved(dt) = min(rate · dt, remaining quantity, source content, destination room)
//! ```
//!
//! Flows are advanced lazily, whenever the scheduler brings the continuous
//! entities up to date. A time-bounded flow never moves material past its
//! end time, even when it is advanced later.

use crate::continuous::tank::{ContinuousError, ContinuousState};
use crate::core::time::TimeBase;
use serde::{Deserialize, Serialize};

/// When a flow ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowStop {
    /// After running for `duration` seconds
    Time { duration: f64 },
    /// After moving `amount`
    Quantity { amount: f64 },
    /// When the named signal is raised
    Signal { name: String },
}

impl FlowStop {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            FlowStop::Time { duration } if !(*duration > 0.0) || !duration.is_finite() => {
                Err(format!("stop time must be positive, got {}", duration))
            }
            FlowStop::Quantity { amount } if !(*amount > 0.0) || !amount.is_finite() => {
                Err(format!("stop quantity must be positive, got {}", amount))
            }
            FlowStop::Signal { name } if name.trim().is_empty() => {
                Err("stop signal has no name".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Whether raising `signal` ends this flow
    pub fn stops_on(&self, signal: &str) -> bool {
        matches!(self, FlowStop::Signal { name } if name.trim().eq_ignore_ascii_case(signal.trim()))
    }
}

/// Flow as configured on a flow station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankFlowConfig {
    /// Entity drained by the flow; none means the environment
    #[serde(default)]
    pub source: Option<String>,
    /// Entity filled by the flow; none means the environment
    #[serde(default)]
    pub destination: Option<String>,
    /// Transfer per unit of `time_base`
    pub rate: f64,
    #[serde(default)]
    pub time_base: TimeBase,
    pub stop: FlowStop,
}

/// Flow with entities resolved to their indices
#[derive(Debug, Clone, PartialEq)]
pub struct TankFlow {
    pub source: Option<usize>,
    pub destination: Option<usize>,
    pub rate_per_second: f64,
    pub stop: FlowStop,
}

/// A flow started at some instant of a run
#[derive(Debug, Clone)]
pub struct ActiveFlow {
    flow: TankFlow,
    started: f64,
    last_time: f64,
    moved: f64,
    finished: bool,
}

impl ActiveFlow {
    pub fn start(flow: TankFlow, time: f64) -> Self {
        Self {
            flow,
            started: time,
            last_time: time,
            moved: 0.0,
            finished: false,
        }
    }

    pub fn flow(&self) -> &TankFlow {
        &self.flow
    }

    pub fn started(&self) -> f64 {
        self.started
    }

    /// Quantity moved so far
    pub fn moved(&self) -> f64 {
        self.moved
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// End the flow regardless of its stop condition
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Move material for the time between the last advance and `now`
    ///
    /// Both ends must already be integrated up to `now`. Returns the
    /// quantity moved by this call.
    pub fn advance(
        &mut self,
        now: f64,
        entities: &mut [ContinuousState],
    ) -> Result<f64, ContinuousError> {
        if self.finished {
            return Ok(0.0);
        }
        if now < self.last_time {
            return Err(ContinuousError::TimeWentBackwards {
                now,
                last: self.last_time,
            });
        }

        let mut dt = now - self.last_time;
        if let FlowStop::Time { duration } = self.flow.stop {
            dt = dt.min((self.started + duration - self.last_time).max(0.0));
        }
        let mut quantity = self.flow.rate_per_second * dt;
        if let FlowStop::Quantity { amount } = self.flow.stop {
            quantity = quantity.min(amount - self.moved);
        }
        if let Some(source) = self.flow.source {
            quantity = quantity.min(entity(entities, source)?.available_out());
        }
        if let Some(destination) = self.flow.destination {
            quantity = quantity.min(entity(entities, destination)?.room_in());
        }
        let quantity = quantity.max(0.0);

        if quantity > 0.0 {
            if let Some(source) = self.flow.source {
                entity_mut(entities, source)?.transfer(-quantity);
            }
            if let Some(destination) = self.flow.destination {
                entity_mut(entities, destination)?.transfer(quantity);
            }
        }
        self.moved += quantity;
        self.last_time = now;

        self.finished = match self.flow.stop {
            FlowStop::Time { duration } => now >= self.started + duration,
            FlowStop::Quantity { amount } => self.moved >= amount,
            FlowStop::Signal { .. } => false,
        };
        Ok(quantity)
    }
}

fn entity(entities: &[ContinuousState], index: usize) -> Result<&ContinuousState, ContinuousError> {
    entities.get(index).ok_or(ContinuousError::NoSuchEntity(index))
}

fn entity_mut(
    entities: &mut [ContinuousState],
    index: usize,
) -> Result<&mut ContinuousState, ContinuousError> {
    entities
        .get_mut(index)
        .ok_or(ContinuousError::NoSuchEntity(index))
}
