//! Execution state models
//!
//! Requests and results passed between the orchestrator, the track
//! scheduler and the region scheduler. None of these outlive a run.

use crate::core::{
    step::{RegionDeployType, Step, StepOutput},
    track::Track,
    variables::{execution_key, StepOutputVariables},
};
use crate::stepper::StepperFactory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cooperative cancellation signal shared by every unit of a run
///
/// Schedulers check it before dispatching more work; running units can
/// await [`CancellationFlag::cancelled`] to stop early.
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the flag has been set
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Set the flag once `deadline` has elapsed
    pub fn cancel_after(&self, deadline: Duration) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            flag.cancel();
        })
    }

    /// A new flag that is set when this one is, or once `deadline` has elapsed
    ///
    /// Setting the returned flag leaves this one untouched. Abort the
    /// returned handle to drop the timer.
    pub fn with_deadline(&self, deadline: Duration) -> (CancellationFlag, JoinHandle<()>) {
        let bounded = CancellationFlag::new();
        if self.is_cancelled() {
            bounded.cancel();
        }

        let parent = self.clone();
        let flag = bounded.clone();
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {}
            }
            flag.cancel();
        });
        (bounded, timer)
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one region run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionOutput {
    /// Merged variables of every level that ran
    pub step_output_variables: StepOutputVariables,

    /// Number of failed steps
    pub failure_count: usize,

    /// Number of steps that failed in their test stage
    pub failed_test_count: usize,

    /// Outputs of every step that ran, in merge order
    pub step_outputs: Vec<StepOutput>,

    /// Whether the run stopped early because the run was cancelled
    pub cancelled: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionOutput {
    pub fn has_failed(&self) -> bool {
        self.failure_count > 0
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutput> {
        self.step_outputs.iter().filter(|o| o.is_failure())
    }

    /// Record a finished step and update the failure counters
    pub fn record(&mut self, output: StepOutput) {
        if output.is_failure() {
            self.failure_count += 1;
            if output.is_test_failure() {
                self.failed_test_count += 1;
            }
        }
        self.step_outputs.push(output);
    }
}

/// One region's run of a track
#[derive(Debug, Clone, Serialize)]
pub struct RegionExecution {
    pub track_name: String,
    pub track_dir: PathBuf,

    #[serde(skip)]
    pub track_ordered_steps: BTreeMap<usize, Vec<Step>>,

    pub track_step_progressions_count: usize,
    pub region: String,
    pub region_deploy_type: RegionDeployType,

    /// Incoming seed variables; owned by this run alone
    #[serde(skip)]
    pub default_step_output_variables: StepOutputVariables,

    pub output: ExecutionOutput,

    #[serde(skip)]
    pub stepper_factory: Arc<dyn StepperFactory>,

    #[serde(skip)]
    pub cancel: CancellationFlag,
}

impl RegionExecution {
    /// Create a region run request for `track`
    pub fn new(
        track: &Track,
        region: impl Into<String>,
        region_deploy_type: RegionDeployType,
        default_step_output_variables: StepOutputVariables,
        stepper_factory: Arc<dyn StepperFactory>,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            track_name: track.name.clone(),
            track_dir: track.dir.clone(),
            track_ordered_steps: track.ordered_steps.clone(),
            track_step_progressions_count: track.step_progressions_count,
            region: region.into(),
            region_deploy_type,
            default_step_output_variables,
            output: ExecutionOutput::default(),
            stepper_factory,
            cancel,
        }
    }

    /// Key of this run in a destroy request's seed variables
    pub fn execution_key(&self) -> String {
        execution_key(self.region_deploy_type, &self.region)
    }
}

/// Result of a track run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Output {
    pub name: String,

    /// Variables produced by the primary run
    pub primary_step_output_variables: StepOutputVariables,

    /// Region runs, primary first
    pub executions: Vec<RegionExecution>,
}

impl Output {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn primary(&self) -> Option<&RegionExecution> {
        self.executions
            .first()
            .filter(|e| e.region_deploy_type == RegionDeployType::Primary)
    }

    pub fn failure_count(&self) -> usize {
        self.executions.iter().map(|e| e.output.failure_count).sum()
    }

    pub fn failed_test_count(&self) -> usize {
        self.executions.iter().map(|e| e.output.failed_test_count).sum()
    }

    /// Seed variables for a destroy pass, keyed `<RegionDeployType>-<Region>`
    pub fn destroy_seed(&self) -> HashMap<String, StepOutputVariables> {
        self.executions
            .iter()
            .map(|e| (e.execution_key(), e.output.step_output_variables.clone()))
            .collect()
    }
}

/// Track-level request envelope
#[derive(Debug, Clone)]
pub struct Execution {
    pub run_id: Uuid,
    pub stepper_factory: Arc<dyn StepperFactory>,
    pub cancel: CancellationFlag,
    pub output: ExecutionOutput,

    /// Destroy seeds keyed `<RegionDeployType>-<Region>`; empty for deploys
    pub default_execution_step_output_variables: HashMap<String, StepOutputVariables>,
}

impl Execution {
    pub fn new(run_id: Uuid, stepper_factory: Arc<dyn StepperFactory>, cancel: CancellationFlag) -> Self {
        Self {
            run_id,
            stepper_factory,
            cancel,
            output: ExecutionOutput::default(),
            default_execution_step_output_variables: HashMap::new(),
        }
    }

    /// Turn this request into a destroy request seeded from a deploy pass
    pub fn for_destroy(mut self, deployed: &Output) -> Self {
        self.output = ExecutionOutput::default();
        self.default_execution_step_output_variables = deployed.destroy_seed();
        self
    }

    /// Seed variables recorded for one region run, if any
    pub fn seed_for(&self, deploy_type: RegionDeployType, region: &str) -> Option<&StepOutputVariables> {
        self.default_execution_step_output_variables
            .get(&execution_key(deploy_type, region))
    }
}

/// Deploy and optional destroy result of one track
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackRun {
    pub name: String,
    pub deploy: Option<Output>,
    pub destroy: Option<Output>,

    /// Set when the track's task died before producing a result
    pub error: Option<String>,
}

impl TrackRun {
    fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.deploy.iter().chain(self.destroy.iter())
    }

    pub fn failure_count(&self) -> usize {
        let aborted = usize::from(self.error.is_some());
        self.outputs().map(Output::failure_count).sum::<usize>() + aborted
    }

    pub fn failed_test_count(&self) -> usize {
        self.outputs().map(Output::failed_test_count).sum()
    }
}

/// Aggregate result of an orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,

    /// Track results in arrival order
    pub tracks: Vec<TrackRun>,
}

impl RunOutput {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, name: &str) -> Option<&TrackRun> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn failure_count(&self) -> usize {
        self.tracks.iter().map(TrackRun::failure_count).sum()
    }

    pub fn failed_test_count(&self) -> usize {
        self.tracks.iter().map(TrackRun::failed_test_count).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::NoopStepperFactory;

    fn region_execution(deploy_type: RegionDeployType, region: &str, vars: &[(&str, &str, &str)]) -> RegionExecution {
        let track = Track::from_steps("track-a", "tracks/track-a", vec![]);
        let mut execution = RegionExecution::new(
            &track,
            region,
            deploy_type,
            StepOutputVariables::new(),
            Arc::new(NoopStepperFactory),
            CancellationFlag::new(),
        );
        for (key, name, value) in vars {
            execution
                .output
                .step_output_variables
                .entry(key.to_string())
                .or_default()
                .insert(name.to_string(), value.to_string());
        }
        execution
    }

    #[test]
    fn test_destroy_seed_keys() {
        let mut output = Output::new("track-a");
        output.executions.push(region_execution(
            RegionDeployType::Primary,
            "primaryregion",
            &[("step1", "primary", "primary")],
        ));
        output.executions.push(region_execution(
            RegionDeployType::Regional,
            "regionalregion",
            &[("step1", "regional", "regional")],
        ));

        let seed = output.destroy_seed();

        assert_eq!(seed.len(), 2);
        assert_eq!(seed["Primary-primaryregion"]["step1"]["primary"], "primary");
        assert_eq!(seed["Regional-regionalregion"]["step1"]["regional"], "regional");
    }

    #[test]
    fn test_output_counts() {
        let mut output = Output::new("track-a");
        let mut primary = region_execution(RegionDeployType::Primary, "us-east-1", &[]);
        primary.output.failure_count = 2;
        primary.output.failed_test_count = 1;
        let mut regional = region_execution(RegionDeployType::Regional, "us-west-2", &[]);
        regional.output.failure_count = 1;
        output.executions.push(primary);
        output.executions.push(regional);

        assert_eq!(output.failure_count(), 3);
        assert_eq!(output.failed_test_count(), 1);
        assert_eq!(output.primary().map(|e| e.region.as_str()), Some("us-east-1"));
    }

    #[test]
    fn test_record_counts_failures() {
        let mut output = ExecutionOutput::default();
        output.record(Step::new("ok", "t", 1).complete("r", RegionDeployType::Primary, Default::default()).output);
        output.record(
            Step::new("broken", "t", 1)
                .fail("r", RegionDeployType::Primary, crate::core::step::StepStage::Provision, "boom")
                .output,
        );
        output.record(
            Step::new("untested", "t", 1)
                .fail("r", RegionDeployType::Primary, crate::core::step::StepStage::Test, "tests failed")
                .output,
        );

        assert_eq!(output.failure_count, 2);
        assert_eq!(output.failed_test_count, 1);
        assert_eq!(output.step_outputs.len(), 3);
        let failed: Vec<_> = output.failed_steps().map(|o| o.step_name.as_str()).collect();
        assert_eq!(failed, vec!["broken", "untested"]);
    }

    #[test]
    fn test_aborted_track_counts_as_failure() {
        let run = TrackRun {
            name: "track-a".to_string(),
            error: Some("task panicked".to_string()),
            ..Default::default()
        };
        assert_eq!(run.failure_count(), 1);
    }

    #[test]
    fn test_empty_run_output_is_success() {
        let output = RunOutput::new(Uuid::new_v4());
        assert!(output.is_success());
        assert_eq!(output.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_flag() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());

        let waiter = tokio::spawn(async move { observer.cancelled().await });
        flag.cancel();

        waiter.await.unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_flag_follows_parent_only_downwards() {
        let parent = CancellationFlag::new();
        let (bounded, timer) = parent.with_deadline(Duration::from_secs(30));
        bounded.cancel();
        assert!(!parent.is_cancelled());
        timer.abort();

        let (bounded, timer) = parent.with_deadline(Duration::from_secs(30));
        parent.cancel();
        tokio::time::timeout(Duration::from_secs(5), bounded.cancelled())
            .await
            .expect("bounded flag should follow its parent");
        timer.abort();

        let (bounded, _) = parent.with_deadline(Duration::from_secs(30));
        assert!(bounded.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_flag_fires_on_its_own() {
        let parent = CancellationFlag::new();
        let (bounded, _timer) = parent.with_deadline(Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(5), bounded.cancelled())
            .await
            .expect("bounded flag should be set after the deadline");
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_deadline() {
        let flag = CancellationFlag::new();
        flag.cancel_after(Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(5), flag.cancelled())
            .await
            .expect("flag should be set after the deadline");
    }
}
