//! Region scheduler - walks a track's progression levels in one region

use crate::{
    core::{
        execution::RegionExecution,
        step::StepStage,
        variables::{append_step_output, StepOutputVariables},
    },
    execution::{RegionRunner, StepAction, StepRequest, StepRunner, TaskGroup},
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs the progression levels of one region run
///
/// Levels run in ascending order. The steps of a level run concurrently
/// against a read-only snapshot of the variables merged so far; their
/// outputs are merged one by one only after the whole level has joined.
/// A level with any failed step ends the run.
pub struct RegionScheduler<S> {
    steps: Arc<S>,
}

impl<S: StepRunner + 'static> RegionScheduler<S> {
    pub fn new(steps: S) -> Self {
        Self { steps: Arc::new(steps) }
    }

    /// Share an existing step runner
    pub fn from_arc(steps: Arc<S>) -> Self {
        Self { steps }
    }

    async fn execute(&self, mut execution: RegionExecution, action: StepAction) -> RegionExecution {
        info!(
            track = %execution.track_name,
            region = %execution.region,
            deploy_type = %execution.region_deploy_type,
            "Starting {:?} of {} progression levels",
            action,
            execution.track_step_progressions_count
        );
        execution.output.started_at = Some(Utc::now());

        let mut variables = execution.default_step_output_variables.clone();

        for level in 1..=execution.track_step_progressions_count {
            if execution.cancel.is_cancelled() {
                warn!(
                    track = %execution.track_name,
                    region = %execution.region,
                    "Run cancelled before progression level {}",
                    level
                );
                execution.output.cancelled = true;
                break;
            }

            let steps = execution
                .track_ordered_steps
                .get(&level)
                .cloned()
                .unwrap_or_default();
            if steps.is_empty() {
                debug!("Progression level {} has no steps, skipping", level);
                continue;
            }

            // Snapshot shared read-only by every step of the level
            let baseline = Arc::new(variables);
            let mut group = TaskGroup::new();

            for step in steps {
                let request = StepRequest {
                    step: step.clone(),
                    region: execution.region.clone(),
                    region_deploy_type: execution.region_deploy_type,
                    progression_level: level,
                    variables: Arc::clone(&baseline),
                    stepper_factory: Arc::clone(&execution.stepper_factory),
                    action,
                    cancel: execution.cancel.clone(),
                };
                let runner = Arc::clone(&self.steps);
                group.dispatch(step, async move { runner.run_step(request).await });
            }

            debug!("Dispatched {} steps at progression level {}", group.len(), level);
            let results = group.join().await;

            // Every request has been dropped by now, so the snapshot is ours again
            variables = Arc::try_unwrap(baseline).unwrap_or_else(|shared| StepOutputVariables::clone(&shared));

            let mut level_failed = false;
            for (step, result) in results {
                let finished = match result {
                    Ok(finished) => finished,
                    Err(e) => {
                        error!("Step task for {} died: {}", step.name, e);
                        step.fail(
                            &execution.region,
                            execution.region_deploy_type,
                            StepStage::Provision,
                            format!("step task died: {}", e),
                        )
                    }
                };

                variables = append_step_output(variables, &finished.output);
                level_failed |= finished.output.is_failure();
                execution.output.record(finished.output);
            }

            if level_failed {
                warn!(
                    track = %execution.track_name,
                    region = %execution.region,
                    "Progression level {} failed, skipping remaining levels",
                    level
                );
                break;
            }
        }

        execution.output.step_output_variables = variables;
        execution.output.completed_at = Some(Utc::now());

        info!(
            track = %execution.track_name,
            region = %execution.region,
            failures = execution.output.failure_count,
            failed_tests = execution.output.failed_test_count,
            "Region run finished"
        );

        execution
    }
}

#[async_trait]
impl<S: StepRunner + 'static> RegionRunner for RegionScheduler<S> {
    async fn deploy_region(&self, execution: RegionExecution) -> RegionExecution {
        self.execute(execution, StepAction::Deploy).await
    }

    async fn destroy_region(&self, execution: RegionExecution) -> RegionExecution {
        self.execute(execution, StepAction::Destroy).await
    }
}
