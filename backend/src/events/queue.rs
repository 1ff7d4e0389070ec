//! Future event list

use crate::events::types::{EventKind, ScheduledEvent};
use std::collections::BinaryHeap;
use tracing::trace;

/// Time-ordered event queue with FIFO order among simultaneous events
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::events::{EventKind, EventQueue};
/// use queuesim_core_rs::StationId;
///
/// let mut queue = EventQueue::new();
/// queue.schedule(5.0, EventKind::Arrival { source: StationId(0) });
/// queue.schedule(1.0, EventKind::Arrival { source: StationId(1) });
/// queue.schedule(1.0, EventKind::Arrival { source: StationId(2) });
///
/// let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.kind).collect();
/// assert_eq!(
///     order,
///     vec![
///         EventKind::Arrival { source: StationId(1) },
///         EventKind::Arrival { source: StationId(2) },
///         EventKind::Arrival { source: StationId(0) },
///     ]
/// );
/// ```
#[derive(Debug, Default)]
pub struct EventQueue {
    next_seq: u64,
    heap: BinaryHeap<ScheduledEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event firing at `time`
    pub fn schedule(&mut self, time: f64, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        trace!(time, seq, event = kind.name(), "schedule");
        self.heap.push(ScheduledEvent { time, seq, kind });
    }

    /// Remove and return the earliest event
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    /// Firing time of the earliest event
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
