//! trackflow - multi-region infrastructure deployment track orchestrator

pub mod cli;
pub mod core;
pub mod discovery;
pub mod execution;
pub mod stepper;

// Re-export commonly used types
pub use crate::core::{CancellationFlag, RegionDeployType, RunConfig, RunOutput, Step, StepOutputVariables, Track};
pub use discovery::{DirectoryTracker, DiscoveryError};
pub use execution::{default_orchestrator, Orchestrator, RegionScheduler, StepExecutor, TrackScheduler};
pub use stepper::{NoopStepperFactory, ScriptStepperFactory, Stepper, StepperError, StepperFactory};
