//! Orchestration of a catalog migration run: the batch scheduler and the
//! end-to-end `run` that ties source, embedding client and sink together.
pub mod run;
pub mod scheduler;

pub use run::{run, RunSummary};
pub use scheduler::{BatchScheduler, SchedulerOptions};
