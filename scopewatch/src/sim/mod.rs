//! Simulated cooperative scheduler
//!
//! - `runtime`: virtual-clock run loop that reports to instruments
//! - `workload`: scripted task roles and the demo program

pub mod runtime;
pub mod workload;

pub use runtime::{SimRuntime, SimStatistics, StepOutcome, SIM_IO_BACKEND};
pub use workload::{Role, Spawn, Workload, DEMO_STUBBORN_BATCH};
