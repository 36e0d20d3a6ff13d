//! Track execution engine
//!
//! Three layers, each generic over the one below it:
//! [`Orchestrator`] runs tracks concurrently, [`TrackScheduler`] runs the
//! primary region and then the regional fan-out of one track, and
//! [`RegionScheduler`] walks the progression levels of one region run.
//! [`StepExecutor`] performs a single step.

pub mod executor;
pub mod orchestrator;
pub mod region;
pub mod task_group;
pub mod track;

pub use executor::StepExecutor;
pub use orchestrator::{EventHandler, Orchestrator, RunEvent};
pub use region::RegionScheduler;
pub use task_group::TaskGroup;
pub use track::TrackScheduler;

use crate::core::{
    config::RunConfig,
    execution::{CancellationFlag, Execution, Output, RegionExecution},
    step::{RegionDeployType, Step},
    track::Track,
    variables::StepOutputVariables,
};
use crate::stepper::StepperFactory;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Which infrastructure action a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepAction {
    Deploy,
    Destroy,
}

/// Everything needed to run one step in one region
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub step: Step,
    pub region: String,
    pub region_deploy_type: RegionDeployType,
    pub progression_level: usize,

    /// Variables of every earlier level, shared read-only by the whole level
    pub variables: Arc<StepOutputVariables>,

    pub stepper_factory: Arc<dyn StepperFactory>,
    pub action: StepAction,
    pub cancel: CancellationFlag,
}

/// Runs one step to completion
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, request: StepRequest) -> Step;
}

/// Runs one region's walk over a track's progression levels
#[async_trait]
pub trait RegionRunner: Send + Sync {
    async fn deploy_region(&self, execution: RegionExecution) -> RegionExecution;

    async fn destroy_region(&self, execution: RegionExecution) -> RegionExecution;
}

/// Runs a whole track across the primary and target regions
#[async_trait]
pub trait TrackRunner: Send + Sync {
    async fn deploy_track(&self, execution: Execution, config: &RunConfig, track: &Track) -> Output;

    async fn destroy_track(&self, execution: Execution, config: &RunConfig, track: &Track) -> Output;
}

/// The orchestrator wired with the production schedulers
pub type DefaultOrchestrator = Orchestrator<TrackScheduler<RegionScheduler<StepExecutor>>>;

/// Build the production stack with an optional per-step timeout
pub fn default_orchestrator(step_timeout: Option<Duration>) -> DefaultOrchestrator {
    let steps = StepExecutor::new(step_timeout);
    Orchestrator::new(TrackScheduler::new(RegionScheduler::new(steps)))
}
