pub mod run;

pub use run::{RunRecord, RunStatus};
