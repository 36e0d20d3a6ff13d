//! Step domain model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Which kind of region run a step is executing in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegionDeployType {
    /// The single mandatory baseline run
    #[default]
    Primary,
    /// An additional run against one target region
    Regional,
}

impl RegionDeployType {
    /// Canonical name, used in destroy seed keys (`Primary-us-east-1`)
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionDeployType::Primary => "Primary",
            RegionDeployType::Regional => "Regional",
        }
    }

    /// Suffix appended to step names when merging output variables
    pub fn key_suffix(&self) -> Option<&'static str> {
        match self {
            RegionDeployType::Primary => None,
            RegionDeployType::Regional => Some("regional"),
        }
    }
}

impl fmt::Display for RegionDeployType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepStatus {
    #[default]
    NotStarted,
    Success,
    Fail,
}

/// Stage of a step in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStage {
    /// Provisioning or teardown of the step's resources
    Provision,
    /// The step's test suite
    Test,
}

/// Result of executing a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutput {
    pub step_name: String,
    pub status: StepStatus,
    /// Raw scalar values produced by the stepper
    pub output_variables: HashMap<String, serde_json::Value>,
    pub region_deploy_type: RegionDeployType,
    pub region: String,
    /// Set when `status` is `Fail`
    pub failed_stage: Option<StepStage>,
    pub error: Option<String>,
}

impl StepOutput {
    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Fail
    }

    pub fn is_test_failure(&self) -> bool {
        self.is_failure() && self.failed_stage == Some(StepStage::Test)
    }
}

/// One provisioning unit of a track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub track_name: String,
    pub dir: PathBuf,
    pub progression_level: usize,
    pub tests_exist: bool,
    pub regional_resources_exist: bool,
    pub output: StepOutput,
}

impl Step {
    pub fn new(name: impl Into<String>, track_name: impl Into<String>, progression_level: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            track_name: track_name.into(),
            progression_level,
            ..Default::default()
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_tests(mut self, tests_exist: bool) -> Self {
        self.tests_exist = tests_exist;
        self
    }

    pub fn with_regional_resources(mut self, regional_resources_exist: bool) -> Self {
        self.regional_resources_exist = regional_resources_exist;
        self
    }

    /// Record a finished run on this step
    pub fn complete(
        mut self,
        region: &str,
        region_deploy_type: RegionDeployType,
        output_variables: HashMap<String, serde_json::Value>,
    ) -> Self {
        self.output = StepOutput {
            step_name: self.name.clone(),
            status: StepStatus::Success,
            output_variables,
            region_deploy_type,
            region: region.to_string(),
            failed_stage: None,
            error: None,
        };
        self
    }

    /// Record a failed run on this step
    pub fn fail(
        mut self,
        region: &str,
        region_deploy_type: RegionDeployType,
        stage: StepStage,
        error: impl Into<String>,
    ) -> Self {
        self.output = StepOutput {
            step_name: self.name.clone(),
            status: StepStatus::Fail,
            output_variables: HashMap::new(),
            region_deploy_type,
            region: region.to_string(),
            failed_stage: Some(stage),
            error: Some(error.into()),
        };
        self
    }

    /// Record a failed run whose resources exist and produced output variables
    pub fn fail_with_outputs(
        self,
        region: &str,
        region_deploy_type: RegionDeployType,
        stage: StepStage,
        error: impl Into<String>,
        output_variables: HashMap<String, serde_json::Value>,
    ) -> Self {
        let mut step = self.fail(region, region_deploy_type, stage, error);
        step.output.output_variables = output_variables;
        step
    }

    /// Whitelist token identifying this step, `#<stage>#<track>#<step>`
    pub fn whitelist_token(&self, stage: &str) -> String {
        format!("#{}#{}#{}", stage, self.track_name, self.name)
    }
}
