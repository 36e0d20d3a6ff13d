//! Mock stepper and fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackflow::core::config::RunConfig;
use trackflow::core::step::{RegionDeployType, Step};
use trackflow::core::track::Track;
use trackflow::core::variables::StepOutputVariables;
use trackflow::stepper::{OutputVariables, StepContext, Stepper, StepperError, StepperFactory};

/// One call made to a mock stepper
#[derive(Debug, Clone)]
pub struct MockCall {
    pub action: &'static str,
    pub step: String,
    pub region: String,
    pub deploy_type: RegionDeployType,
    pub level: usize,
    pub variables: StepOutputVariables,
}

#[derive(Debug, Default)]
struct MockState {
    outputs: HashMap<String, Vec<(String, String)>>,
    failing_deploys: HashSet<String>,
    failing_tests: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<MockCall>>,
}

/// Stepper factory with outcomes scripted per step
///
/// Every successful deploy outputs `region = <region>` plus the values set
/// with [`MockStepperFactory::with_output`]. Failures are keyed by step
/// name, or by `step@region` to fail a single region.
#[derive(Debug, Default)]
pub struct MockStepperFactory {
    state: Arc<MockState>,
}

impl MockStepperFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> &mut MockState {
        Arc::get_mut(&mut self.state).expect("configure the mock before running it")
    }

    pub fn with_output(mut self, step: &str, vars: &[(&str, &str)]) -> Self {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.state_mut().outputs.insert(step.to_string(), vars);
        self
    }

    pub fn fail_deploy(mut self, key: &str) -> Self {
        self.state_mut().failing_deploys.insert(key.to_string());
        self
    }

    pub fn fail_test(mut self, key: &str) -> Self {
        self.state_mut().failing_tests.insert(key.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.state_mut().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, action: &str, step: &str, region: &str) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action && c.step == step && c.region == region)
            .collect()
    }

    pub fn regions_called(&self, action: &str) -> HashSet<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .map(|c| c.region)
            .collect()
    }
}

impl StepperFactory for MockStepperFactory {
    fn stepper(&self, _step: &Step) -> Result<Box<dyn Stepper>, StepperError> {
        Ok(Box::new(MockStepper {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockStepper {
    state: Arc<MockState>,
}

impl MockStepper {
    fn record(&self, action: &'static str, ctx: &StepContext) {
        self.state.calls.lock().unwrap().push(MockCall {
            action,
            step: ctx.step.name.clone(),
            region: ctx.region.clone(),
            deploy_type: ctx.region_deploy_type,
            level: ctx.progression_level,
            variables: ctx.variables.as_ref().clone(),
        });
    }

    fn fails(set: &HashSet<String>, ctx: &StepContext) -> bool {
        set.contains(&ctx.step.name) || set.contains(&format!("{}@{}", ctx.step.name, ctx.region))
    }
}

#[async_trait]
impl Stepper for MockStepper {
    async fn deploy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        self.record("deploy", ctx);
        if let Some(delay) = self.state.delay {
            tokio::time::sleep(delay).await;
        }

        if Self::fails(&self.state.failing_deploys, ctx) {
            return Err(StepperError::Internal(format!("{} failed in {}", ctx.step.name, ctx.region)));
        }

        let mut vars = OutputVariables::from([("region".to_string(), json!(ctx.region))]);
        if let Some(extra) = self.state.outputs.get(&ctx.step.name) {
            vars.extend(extra.iter().map(|(k, v)| (k.clone(), json!(v))));
        }
        Ok(vars)
    }

    async fn destroy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        self.record("destroy", ctx);
        Ok(OutputVariables::new())
    }

    async fn test(&self, ctx: &StepContext) -> Result<(), StepperError> {
        self.record("test", ctx);
        if Self::fails(&self.state.failing_tests, ctx) {
            return Err(StepperError::Internal(format!("tests of {} failed", ctx.step.name)));
        }
        Ok(())
    }
}

/// Build a track from `(level, name, tests, regional)` tuples
pub fn track(name: &str, steps: &[(usize, &str, bool, bool)]) -> Track {
    let steps = steps
        .iter()
        .map(|(level, step, tests, regional)| {
            Step::new(*step, name, *level)
                .with_dir(format!("tracks/{}/step{}_{}", name, level, step))
                .with_tests(*tests)
                .with_regional_resources(*regional)
        })
        .collect();
    Track::from_steps(name, format!("tracks/{}", name), steps)
}

pub fn config(primary: &str, regions: &[&str], self_destroy: bool) -> RunConfig {
    RunConfig {
        primary_region: primary.to_string(),
        target_all: true,
        target_regions: regions.iter().map(|r| r.to_string()).collect(),
        self_destroy,
        ..Default::default()
    }
}
