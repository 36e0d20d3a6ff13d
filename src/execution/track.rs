//! Track scheduler - runs a track in the primary region, then fans out

use crate::{
    core::{
        config::RunConfig,
        execution::{Execution, Output, RegionExecution},
        step::RegionDeployType,
        track::Track,
        variables::StepOutputVariables,
    },
    execution::{RegionRunner, StepAction, TaskGroup, TrackRunner},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sequences primary-before-regional runs of one track
///
/// The primary run always goes first and completes before any regional
/// decision. On deploy a failed primary suppresses the regional runs; on
/// destroy the regional teardown is attempted regardless.
pub struct TrackScheduler<R> {
    regions: Arc<R>,
}

impl<R: RegionRunner + 'static> TrackScheduler<R> {
    pub fn new(regions: R) -> Self {
        Self {
            regions: Arc::new(regions),
        }
    }

    /// Share an existing region runner
    pub fn from_arc(regions: Arc<R>) -> Self {
        Self { regions }
    }

    async fn run_region(&self, execution: RegionExecution, action: StepAction) -> RegionExecution {
        match action {
            StepAction::Deploy => self.regions.deploy_region(execution).await,
            StepAction::Destroy => self.regions.destroy_region(execution).await,
        }
    }

    /// Run every regional execution concurrently, results in arrival order
    async fn fan_out(
        &self,
        execution: &Execution,
        track: &Track,
        regional: Vec<(String, StepOutputVariables)>,
        action: StepAction,
    ) -> Vec<RegionExecution> {
        let mut group = TaskGroup::new();

        for (region, seed) in regional {
            let request = RegionExecution::new(
                track,
                region.clone(),
                RegionDeployType::Regional,
                seed,
                Arc::clone(&execution.stepper_factory),
                execution.cancel.clone(),
            );
            let regions = Arc::clone(&self.regions);
            group.dispatch(region, async move {
                match action {
                    StepAction::Deploy => regions.deploy_region(request).await,
                    StepAction::Destroy => regions.destroy_region(request).await,
                }
            });
        }

        info!(track = %track.name, "Dispatched {} regional runs", group.len());

        let mut finished = Vec::new();
        for (region, result) in group.join().await {
            match result {
                Ok(done) => finished.push(done),
                Err(e) => {
                    error!(track = %track.name, region = %region, "Region task died: {}", e);
                    let mut dead = RegionExecution::new(
                        track,
                        region,
                        RegionDeployType::Regional,
                        StepOutputVariables::new(),
                        Arc::clone(&execution.stepper_factory),
                        execution.cancel.clone(),
                    );
                    dead.output.failure_count = 1;
                    finished.push(dead);
                }
            }
        }
        finished
    }

    fn regional_targets(config: &RunConfig, track: &Track) -> Vec<String> {
        if track.regional_deployment {
            config.target_regions()
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl<R: RegionRunner + 'static> TrackRunner for TrackScheduler<R> {
    async fn deploy_track(&self, execution: Execution, config: &RunConfig, track: &Track) -> Output {
        info!(track = %track.name, region = %config.primary_region, "Deploying track");
        let mut output = Output::new(&track.name);

        let primary = RegionExecution::new(
            track,
            config.primary_region.clone(),
            RegionDeployType::Primary,
            StepOutputVariables::new(),
            Arc::clone(&execution.stepper_factory),
            execution.cancel.clone(),
        );
        let primary = self.run_region(primary, StepAction::Deploy).await;

        output.primary_step_output_variables = primary.output.step_output_variables.clone();
        let primary_failed = primary.output.has_failed();
        output.executions.push(primary);

        if primary_failed {
            warn!(track = %track.name, "Primary run failed, skipping regional runs");
            return output;
        }
        if execution.cancel.is_cancelled() {
            warn!(track = %track.name, "Run cancelled, skipping regional runs");
            return output;
        }

        let regional: Vec<_> = Self::regional_targets(config, track)
            .into_iter()
            .map(|region| (region, output.primary_step_output_variables.clone()))
            .collect();

        if !regional.is_empty() {
            let finished = self.fan_out(&execution, track, regional, StepAction::Deploy).await;
            output.executions.extend(finished);
        }

        info!(
            track = %track.name,
            failures = output.failure_count(),
            "Track deploy finished with {} region runs",
            output.executions.len()
        );
        output
    }

    async fn destroy_track(&self, execution: Execution, config: &RunConfig, track: &Track) -> Output {
        info!(track = %track.name, region = %config.primary_region, "Destroying track");
        let mut output = Output::new(&track.name);

        let primary_seed = execution
            .seed_for(RegionDeployType::Primary, &config.primary_region)
            .cloned()
            .unwrap_or_default();

        let primary = RegionExecution::new(
            track,
            config.primary_region.clone(),
            RegionDeployType::Primary,
            primary_seed.clone(),
            Arc::clone(&execution.stepper_factory),
            execution.cancel.clone(),
        );
        let primary = self.run_region(primary, StepAction::Destroy).await;

        output.primary_step_output_variables = primary.output.step_output_variables.clone();
        if primary.output.has_failed() {
            warn!(track = %track.name, "Primary teardown failed, continuing with regional teardown");
        }
        output.executions.push(primary);

        if execution.cancel.is_cancelled() {
            warn!(track = %track.name, "Run cancelled, skipping regional teardown");
            return output;
        }

        let regional: Vec<_> = Self::regional_targets(config, track)
            .into_iter()
            .map(|region| {
                let seed = execution
                    .seed_for(RegionDeployType::Regional, &region)
                    .cloned()
                    .unwrap_or_else(|| primary_seed.clone());
                (region, seed)
            })
            .collect();

        if !regional.is_empty() {
            let finished = self.fan_out(&execution, track, regional, StepAction::Destroy).await;
            output.executions.extend(finished);
        }

        info!(
            track = %track.name,
            failures = output.failure_count(),
            "Track destroy finished with {} region runs",
            output.executions.len()
        );
        output
    }
}
