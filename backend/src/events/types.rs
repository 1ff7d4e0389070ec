//! Scheduled event types
//!
//! An [`EventKind`] names what happens and which station owns it; the
//! [`ScheduledEvent`] wrapper adds the firing time and an insertion sequence
//! number so that simultaneous events fire in the order they were scheduled.

use crate::models::StationId;
use std::cmp::Ordering;

/// Something the run loop has to do at a point in simulated time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A source station creates its next client
    Arrival { source: StationId },

    /// A process station finishes serving a client
    ServiceDone { station: StationId, client: u64 },

    /// A delay station releases a client
    DelayDone { station: StationId, client: u64 },

    /// A continuous entity integrates and reports its value
    AnalogNotify { entity: usize },
}

impl EventKind {
    /// Station that handles the event, if any
    pub fn station(&self) -> Option<StationId> {
        match *self {
            EventKind::Arrival { source } => Some(source),
            EventKind::ServiceDone { station, .. } | EventKind::DelayDone { station, .. } => {
                Some(station)
            }
            EventKind::AnalogNotify { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Arrival { .. } => "arrival",
            EventKind::ServiceDone { .. } => "service_done",
            EventKind::DelayDone { .. } => "delay_done",
            EventKind::AnalogNotify { .. } => "analog_notify",
        }
    }
}

/// Event with its firing time
///
/// Ordered so that a max-heap pops the earliest time first and, among equal
/// times, the lowest sequence number first.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledEvent {
    pub time: f64,
    pub seq: u64,
    pub kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
