//! Script stepper - runs a step's shell scripts as subprocesses

use crate::core::{config::CloudProvider, step::RegionDeployType, step::Step};
use crate::stepper::{OutputVariables, StepContext, Stepper, StepperError, StepperFactory};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEPLOY_SCRIPT: &str = "deploy.sh";
pub const DESTROY_SCRIPT: &str = "destroy.sh";
pub const TEST_SCRIPT: &str = "tests/run.sh";

/// Factory for [`ScriptStepper`]s
#[derive(Debug, Clone)]
pub struct ScriptStepperFactory {
    shell: String,
    cloud_provider: CloudProvider,
}

impl ScriptStepperFactory {
    pub fn new(cloud_provider: CloudProvider) -> Self {
        Self {
            shell: "sh".to_string(),
            cloud_provider,
        }
    }

    /// Use a different shell to run scripts
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl StepperFactory for ScriptStepperFactory {
    fn stepper(&self, _step: &Step) -> Result<Box<dyn Stepper>, StepperError> {
        Ok(Box::new(ScriptStepper {
            shell: self.shell.clone(),
            cloud_provider: self.cloud_provider,
        }))
    }
}

/// Runs `deploy.sh`, `destroy.sh` and `tests/run.sh` from a step directory
///
/// Regional runs use the step's `regional` directory and do nothing for
/// steps without regional resources. A missing script is a no-op. The last
/// non-empty stdout line, when it is a JSON object, holds the output
/// variables.
#[derive(Debug, Clone)]
pub struct ScriptStepper {
    shell: String,
    cloud_provider: CloudProvider,
}

impl ScriptStepper {
    fn working_dir(ctx: &StepContext) -> Option<PathBuf> {
        match ctx.region_deploy_type {
            RegionDeployType::Primary => Some(ctx.step.dir.clone()),
            RegionDeployType::Regional if ctx.step.regional_resources_exist => {
                Some(ctx.step.dir.join("regional"))
            }
            RegionDeployType::Regional => None,
        }
    }

    /// Run one script, returning its stdout or `None` when it does not exist
    async fn run_script(&self, ctx: &StepContext, dir: &Path, script: &str) -> Result<Option<String>, StepperError> {
        if !dir.join(script).is_file() {
            debug!(step = %ctx.step.name, dir = %dir.display(), "No {} script, skipping", script);
            return Ok(None);
        }

        let variables = serde_json::to_string(ctx.variables.as_ref())
            .map_err(|e| StepperError::Internal(format!("Failed to encode step variables: {}", e)))?;

        debug!(step = %ctx.step.name, region = %ctx.region, "Running {}", script);

        let mut command = Command::new(&self.shell);
        command
            .arg(script)
            .current_dir(dir)
            .env("TRACK_NAME", &ctx.step.track_name)
            .env("STEP_NAME", &ctx.step.name)
            .env("REGION", &ctx.region)
            .env("REGION_DEPLOY_TYPE", ctx.region_deploy_type.as_str())
            .env("PROGRESSION_LEVEL", ctx.progression_level.to_string())
            .env("CLOUD_PROVIDER", self.cloud_provider.as_str())
            .env("STEP_OUTPUT_VARIABLES", variables)
            .kill_on_drop(true);

        let output = tokio::select! {
            result = command.output() => result.map_err(|source| StepperError::Spawn {
                command: format!("{} {}", self.shell, script),
                source,
            })?,
            _ = ctx.cancel.cancelled() => return Err(StepperError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            warn!(step = %ctx.step.name, region = %ctx.region, "{} exited with code {}", script, code);
            return Err(StepperError::Exit {
                script: script.to_string(),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| StepperError::Output(format!("Failed to decode {} output: {}", script, e)))?;

        Ok(Some(stdout))
    }

    async fn provision(&self, ctx: &StepContext, script: &str) -> Result<OutputVariables, StepperError> {
        let Some(dir) = Self::working_dir(ctx) else {
            return Ok(OutputVariables::new());
        };

        let stdout = self.run_script(ctx, &dir, script).await?;
        Ok(stdout.as_deref().map(parse_output_variables).unwrap_or_default())
    }
}

#[async_trait]
impl Stepper for ScriptStepper {
    async fn deploy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        self.provision(ctx, DEPLOY_SCRIPT).await
    }

    async fn destroy(&self, ctx: &StepContext) -> Result<OutputVariables, StepperError> {
        self.provision(ctx, DESTROY_SCRIPT).await
    }

    async fn test(&self, ctx: &StepContext) -> Result<(), StepperError> {
        if Self::working_dir(ctx).is_none() {
            return Ok(());
        }

        self.run_script(ctx, &ctx.step.dir, TEST_SCRIPT).await?;
        Ok(())
    }
}

/// Parse output variables from the last non-empty stdout line
pub fn parse_output_variables(stdout: &str) -> OutputVariables {
    let Some(line) = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return OutputVariables::new();
    };

    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line) {
        Ok(map) => map.into_iter().collect(),
        Err(_) => OutputVariables::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_output_variables_last_line() {
        let stdout = "provisioning...\n{\"bucket\": \"logs\", \"count\": 2}\n\n";
        let vars = parse_output_variables(stdout);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars["bucket"], json!("logs"));
        assert_eq!(vars["count"], json!(2));
    }

    #[test]
    fn test_parse_output_variables_without_json() {
        assert!(parse_output_variables("done\n").is_empty());
        assert!(parse_output_variables("").is_empty());
        assert!(parse_output_variables("[1, 2]").is_empty());
    }

    #[test]
    fn test_regional_without_resources_has_no_working_dir() {
        let ctx = StepContext {
            step: Step::new("a12", "track-a", 1).with_dir("tracks/track-a/step1_a12"),
            region: "us-west-2".to_string(),
            region_deploy_type: RegionDeployType::Regional,
            progression_level: 1,
            variables: Default::default(),
            cancel: Default::default(),
        };

        assert!(ScriptStepper::working_dir(&ctx).is_none());

        let regional = StepContext {
            step: ctx.step.clone().with_regional_resources(true),
            ..ctx
        };
        assert_eq!(
            ScriptStepper::working_dir(&regional),
            Some(PathBuf::from("tracks/track-a/step1_a12/regional"))
        );
    }
}
