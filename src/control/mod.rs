// Control module - detection reading in, chain targets and status out

pub mod controller;
pub mod simulation;
pub mod status;

pub use controller::{ControlDecision, MaskingController, MaskingState, StageTarget};
pub use simulation::{simulate_readings, SimulationStep, StageReport};
pub use status::{SessionStatus, StatusEvent};
