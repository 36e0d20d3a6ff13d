//! Step executor - runs individual steps with a stepper

use crate::{
    core::step::{Step, StepStage},
    execution::{StepAction, StepRequest, StepRunner},
    stepper::{StepContext, StepperError},
};
use async_trait::async_trait;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Executes a single step
///
/// Every request yields exactly one finished [`Step`], whether the
/// stepper succeeds, fails, times out or the run is cancelled.
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    step_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(step_timeout: Option<Duration>) -> Self {
        Self { step_timeout }
    }

    async fn limited<F, T>(&self, action: F) -> Result<T, StepperError>
    where
        F: Future<Output = Result<T, StepperError>>,
    {
        match self.step_timeout {
            Some(limit) => timeout(limit, action)
                .await
                .map_err(|_| StepperError::Timeout(limit))?,
            None => action.await,
        }
    }
}

#[async_trait]
impl StepRunner for StepExecutor {
    async fn run_step(&self, request: StepRequest) -> Step {
        let StepRequest {
            step,
            region,
            region_deploy_type,
            progression_level,
            variables,
            stepper_factory,
            action,
            cancel,
        } = request;

        info!(
            track = %step.track_name,
            region = %region,
            deploy_type = %region_deploy_type,
            "Executing step: {} ({:?})",
            step.name,
            action
        );

        // Check for cancellation before starting
        if cancel.is_cancelled() {
            info!("Step {} cancelled before execution", step.name);
            let error = StepperError::Cancelled.to_string();
            return step.fail(&region, region_deploy_type, StepStage::Provision, error);
        }

        let stepper = match stepper_factory.stepper(&step) {
            Ok(stepper) => stepper,
            Err(e) => {
                error!("No stepper for step {}: {}", step.name, e);
                return step.fail(&region, region_deploy_type, StepStage::Provision, e.to_string());
            }
        };

        let ctx = StepContext {
            step: step.clone(),
            region: region.clone(),
            region_deploy_type,
            progression_level,
            variables,
            cancel,
        };

        let provisioned = match action {
            StepAction::Deploy => self.limited(stepper.deploy(&ctx)).await,
            StepAction::Destroy => self.limited(stepper.destroy(&ctx)).await,
        };

        let output_variables = match provisioned {
            Ok(vars) => vars,
            Err(e) => {
                error!(region = %region, "Step {} failed: {}", step.name, e);
                return step.fail(&region, region_deploy_type, StepStage::Provision, e.to_string());
            }
        };

        if action == StepAction::Deploy && step.tests_exist {
            debug!("Running tests for step {}", step.name);
            if let Err(e) = self.limited(stepper.test(&ctx)).await {
                warn!(region = %region, "Tests failed for step {}: {}", step.name, e);
                // The resources exist, so their variables are still needed for teardown
                return step.fail_with_outputs(
                    &region,
                    region_deploy_type,
                    StepStage::Test,
                    e.to_string(),
                    output_variables,
                );
            }
        }

        info!(region = %region, "Step {} completed", step.name);
        step.complete(&region, region_deploy_type, output_variables)
    }
}
