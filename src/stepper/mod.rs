//! Stepper boundary - performs the infrastructure action of one step

pub mod script;

use crate::core::{
    execution::CancellationFlag,
    step::{RegionDeployType, Step},
    variables::StepOutputVariables,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use script::{ScriptStepper, ScriptStepperFactory};

/// Raw output variables produced by a stepper
pub type OutputVariables = HashMap<String, serde_json::Value>;

/// Error types for stepper operations
#[derive(Debug, Error)]
pub enum StepperError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{script} exited with code {code}: {stderr}")]
    Exit {
        script: String,
        code: i32,
        stderr: String,
    },

    #[error("Invalid step output: {0}")]
    Output(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Everything a stepper knows about the run it is part of
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step: Step,
    pub region: String,
    pub region_deploy_type: RegionDeployType,
    pub progression_level: usize,

    /// Baseline variables of the current progression level (read-only)
    pub variables: Arc<StepOutputVariables>,

    pub cancel: CancellationFlag,
}

/// Performs provisioning, teardown and tests for one step
#[async_trait]
pub trait Stepper: Send + Sync {
    async fn deploy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError>;

    async fn destroy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError>;

    async fn test(&self, ctx: &StepContext) -> Result<(), StepperError>;
}

/// Creates steppers; passed through the engine untouched
pub trait StepperFactory: Send + Sync + fmt::Debug {
    fn stepper(&self, step: &Step) -> Result<Box<dyn Stepper>, StepperError>;
}

/// Stepper that succeeds without touching anything (dry runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStepperFactory;

struct NoopStepper;

#[async_trait]
impl Stepper for NoopStepper {
    async fn deploy(&self, _ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        Ok(OutputVariables::new())
    }

    async fn destroy(&self, _ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        Ok(OutputVariables::new())
    }

    async fn test(&self, _ctx: &StepContext) -> Result<(), StepperError> {
        Ok(())
    }
}

impl StepperFactory for NoopStepperFactory {
    fn stepper(&self, _step: &Step) -> Result<Box<dyn Stepper>, StepperError> {
        Ok(Box::new(NoopStepper))
    }
}
