//! Core domain models
//!
//! Tracks, steps and the requests and results that flow through the
//! execution engine, plus the run configuration.

pub mod config;
pub mod execution;
pub mod step;
pub mod track;
pub mod variables;

pub use config::{CloudProvider, ConfigError, RunConfig, WhitelistToken};
pub use execution::{
    CancellationFlag, Execution, ExecutionOutput, Output, RegionExecution, RunOutput, TrackRun,
};
pub use step::{RegionDeployType, Step, StepOutput, StepStage, StepStatus};
pub use track::Track;
pub use variables::{append_step_output, StepOutputVariables};
