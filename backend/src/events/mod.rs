//! Event scheduling for the run loop

pub mod queue;
pub mod types;

pub use queue::EventQueue;
pub use types::{EventKind, ScheduledEvent};
