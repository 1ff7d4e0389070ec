//! Orchestrator - model compilation and the simulation run loop
//!
//! - `config`: serde model description
//! - `compile`: name resolution and validation into a [`CompiledModel`]
//! - `engine`: the event loop ([`Simulation`])
//! - `stats` / `report`: collected indicators and their summaries
//! - `replications`: parallel independent runs

pub mod compile;
pub mod config;
pub mod engine;
pub mod replications;
pub mod report;
pub mod stats;

pub use compile::{
    compile, model_hash, CompiledAssignment, CompiledKind, CompiledModel, CompiledStation,
    ConfigError,
};
pub use config::{
    AssignmentConfig, ModelConfig, RunLimits, StationConfig, StationKind, StatisticsSettings,
    VariablesConfig,
};
pub use engine::{
    CancelToken, Simulation, SimulationError, StepOutcome, TerminationReason, MAX_TRANSIT_HOPS,
};
pub use replications::{run_replications, ReplicationFailure, ReplicationSummary};
pub use report::{
    ContinuousReport, DestinationCount, IndicatorReport, RunReport, StationReport,
    StatisticsReport,
};
pub use stats::{ContinuousStatistics, RunStatistics, StationStatistics};
