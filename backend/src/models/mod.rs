//! Domain models for the queueing-network simulator

pub mod client;
pub mod event;
pub mod state;
pub mod station;

// Re-exports
pub use client::Client;
pub use event::{Event, EventLog};
pub use state::{StationOccupancy, SystemState, VariableEnvironment};
pub use station::StationId;
