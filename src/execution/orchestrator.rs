//! Orchestrator - runs every track concurrently

use crate::{
    core::{
        config::RunConfig,
        execution::{CancellationFlag, Execution, RunOutput, TrackRun},
        track::Track,
    },
    execution::{TaskGroup, TrackRunner},
    stepper::StepperFactory,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Progress events emitted while a run is in flight
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        tracks: usize,
    },
    TrackFinished {
        name: String,
        failures: usize,
        failed_tests: usize,
    },
    RunCompleted {
        run_id: Uuid,
        failures: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum RunMode {
    Deploy { self_destroy: bool },
    Destroy,
}

/// Fans tracks out to concurrent track runs
///
/// Tracks are independent: a failing track never blocks or cancels
/// another. With self-destroy each track is torn down right after its own
/// deploy, seeded with the variables of every region run of that deploy.
pub struct Orchestrator<T> {
    tracks: Arc<T>,
    event_handlers: Vec<EventHandler>,
}

impl<T: TrackRunner + 'static> Orchestrator<T> {
    pub fn new(tracks: T) -> Self {
        Self::from_arc(Arc::new(tracks))
    }

    /// Share an existing track runner
    pub fn from_arc(tracks: Arc<T>) -> Self {
        Self {
            tracks,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    fn emit_event(&self, event: RunEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Deploy every track, destroying each afterwards when `config.self_destroy` is set
    pub async fn deploy(
        &self,
        tracks: Vec<Track>,
        config: &RunConfig,
        stepper_factory: Arc<dyn StepperFactory>,
        cancel: CancellationFlag,
    ) -> RunOutput {
        let mode = RunMode::Deploy {
            self_destroy: config.self_destroy,
        };
        self.run(tracks, config, stepper_factory, cancel, mode).await
    }

    /// Destroy every track without a preceding deploy
    ///
    /// No variables from an earlier deploy are available, so every region
    /// run starts from an empty seed.
    pub async fn destroy(
        &self,
        tracks: Vec<Track>,
        config: &RunConfig,
        stepper_factory: Arc<dyn StepperFactory>,
        cancel: CancellationFlag,
    ) -> RunOutput {
        self.run(tracks, config, stepper_factory, cancel, RunMode::Destroy).await
    }

    async fn run(
        &self,
        tracks: Vec<Track>,
        config: &RunConfig,
        stepper_factory: Arc<dyn StepperFactory>,
        cancel: CancellationFlag,
        mode: RunMode,
    ) -> RunOutput {
        let run_id = Uuid::new_v4();
        let mut output = RunOutput::new(run_id);

        if tracks.is_empty() {
            info!(run_id = %run_id, "No tracks to run");
            return output;
        }

        info!(run_id = %run_id, "Running {} tracks ({:?})", tracks.len(), mode);
        self.emit_event(RunEvent::RunStarted {
            run_id,
            tracks: tracks.len(),
        });

        // The run deadline bounds deploy work; teardown only stops on `cancel`
        let (deploy_cancel, deadline) = match (mode, config.run_timeout()) {
            (RunMode::Deploy { .. }, Some(limit)) => {
                info!(run_id = %run_id, "Deploys cancelled after {:?}", limit);
                let (flag, timer) = cancel.with_deadline(limit);
                (flag, Some(timer))
            }
            _ => (cancel.clone(), None),
        };
        let config = Arc::new(config.clone());
        let mut group = TaskGroup::new();

        for track in tracks {
            let runner = Arc::clone(&self.tracks);
            let config = Arc::clone(&config);
            let execution = Execution::new(run_id, Arc::clone(&stepper_factory), deploy_cancel.clone());
            let teardown_cancel = cancel.clone();
            group.dispatch(track.name.clone(), async move {
                run_track(runner.as_ref(), execution, teardown_cancel, &config, &track, mode).await
            });
        }

        for (name, result) in group.join().await {
            let run = match result {
                Ok(run) => run,
                Err(e) => {
                    error!(track = %name, "Track task died: {}", e);
                    TrackRun {
                        name,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            };

            info!(
                track = %run.name,
                failures = run.failure_count(),
                failed_tests = run.failed_test_count(),
                "Track finished"
            );
            self.emit_event(RunEvent::TrackFinished {
                name: run.name.clone(),
                failures: run.failure_count(),
                failed_tests: run.failed_test_count(),
            });
            output.tracks.push(run);
        }

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        info!(run_id = %run_id, failures = output.failure_count(), "Run finished");
        self.emit_event(RunEvent::RunCompleted {
            run_id,
            failures: output.failure_count(),
        });
        output
    }
}

async fn run_track<T: TrackRunner>(
    runner: &T,
    execution: Execution,
    teardown_cancel: CancellationFlag,
    config: &RunConfig,
    track: &Track,
    mode: RunMode,
) -> TrackRun {
    let mut run = TrackRun {
        name: track.name.clone(),
        ..Default::default()
    };

    match mode {
        RunMode::Deploy { self_destroy } => {
            let deployed = runner.deploy_track(execution.clone(), config, track).await;
            if self_destroy {
                info!(track = %track.name, "Self-destroying track");
                let mut teardown = execution.for_destroy(&deployed);
                teardown.cancel = teardown_cancel;
                run.destroy = Some(runner.destroy_track(teardown, config, track).await);
            }
            run.deploy = Some(deployed);
        }
        RunMode::Destroy => {
            let mut execution = execution;
            execution.cancel = teardown_cancel;
            run.destroy = Some(runner.destroy_track(execution, config, track).await);
        }
    }

    run
}
