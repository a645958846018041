//! Checkpointed harvest pipeline: job loading, the step state machine, the
//! per-target runner and the extract/index steps.

pub mod job;
pub mod runner;
pub mod state;
pub mod steps;

pub use job::{load_job, parse_job};
pub use runner::pipeline::{run_job, StepContext, StepHandler};
pub use runner::progress::{ProgressSink, ProgressTotals};
pub use runner::targets::{ForEachTarget, TargetStep};
pub use runner::{run, RunOptions, RunReport};
pub use state::{Checkpoint, Pipeline};
pub use steps::default_pipeline;
