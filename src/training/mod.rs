mod controller;
mod workload;

pub use controller::{RunController, RunOutcome, RunRequest};
pub use workload::{ExternalCommand, PythonScript, SimulatedWorkload, Workload, WorkloadExit};
