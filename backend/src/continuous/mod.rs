//! Continuous-state entities (tanks and analog values)
//!
//! Lifecycle per entity: Idle → Running → Terminated. While running, the
//! scheduler calls [`ContinuousState::tick`] every notify interval.
//! Entities are coupled by [`ActiveFlow`] transfers and watched by
//! [`TankSensor`] thresholds.

pub mod display;
pub mod flow;
pub mod sensor;
pub mod tank;

pub use display::DisplayCell;
pub use flow::{ActiveFlow, FlowStop, TankFlow, TankFlowConfig};
pub use sensor::{SensorConfig, TankSensor, ThresholdDirection};
pub use tank::{
    Bound, ContinuousConfig, ContinuousError, ContinuousKind, ContinuousState, Phase, Valve,
    ValveDirection, DEFAULT_NOTIFY_INTERVAL, NOTIFY_EPSILON,
};
