//! CLI command definitions

use crate::core::config::{CloudProvider, RunConfig};
use clap::Args;
use std::path::PathBuf;

/// Track selection and region targeting, shared by every command
///
/// Every flag overrides the matching value of the config file.
#[derive(Debug, Args, Clone, Default)]
pub struct TargetArgs {
    /// Path to run configuration YAML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the `tracks/` tree
    #[arg(long)]
    pub tracks_dir: Option<PathBuf>,

    /// Run every discovered step
    #[arg(long)]
    pub target_all: bool,

    /// Whitelisted step, `#<stage>#<track>#<step>` (repeatable)
    #[arg(long = "step")]
    pub steps: Vec<String>,

    /// Stage used to match whitelisted steps
    #[arg(long)]
    pub stage: Option<String>,

    /// Region of the primary run
    #[arg(long)]
    pub primary_region: Option<String>,

    /// Target region for regional runs (repeatable)
    #[arg(long = "region")]
    pub regions: Vec<String>,

    /// Named region group for regional runs
    #[arg(long)]
    pub region_group: Option<String>,

    /// Cloud provider passed to step scripts
    #[arg(long, value_enum)]
    pub cloud_provider: Option<CloudProviderArg>,
}

impl TargetArgs {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(dir) = &self.tracks_dir {
            config.tracks_dir = dir.clone();
        }
        if self.target_all {
            config.target_all = true;
        }
        if !self.steps.is_empty() {
            config.step_whitelist = self.steps.clone();
        }
        if let Some(stage) = &self.stage {
            config.stage = stage.clone();
        }
        if let Some(region) = &self.primary_region {
            config.primary_region = region.clone();
        }
        if !self.regions.is_empty() {
            config.target_regions = self.regions.clone();
        }
        if let Some(group) = &self.region_group {
            config.region_group = Some(group.clone());
        }
        if let Some(provider) = self.cloud_provider {
            config.cloud_provider = provider.into();
        }
    }
}

/// Execution options of deploy and destroy
#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    /// Walk every track without running any step scripts
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Per-step timeout in seconds
    #[arg(long)]
    pub step_timeout: Option<u64>,

    /// Deadline for deploy work in seconds; teardown still runs
    #[arg(long)]
    pub run_timeout: Option<u64>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(secs) = self.step_timeout {
            config.step_timeout_secs = Some(secs);
        }
        if let Some(secs) = self.run_timeout {
            config.run_timeout_secs = Some(secs);
        }
    }
}

/// Deploy tracks
#[derive(Debug, Args, Clone)]
pub struct DeployCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Destroy each track right after deploying it
    #[arg(long)]
    pub self_destroy: bool,
}

/// Destroy tracks
#[derive(Debug, Args, Clone)]
pub struct DestroyCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// List discovered tracks
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a run configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Cloud provider argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CloudProviderArg {
    Aws,
    Azure,
    Gcp,
}

impl From<CloudProviderArg> for CloudProvider {
    fn from(arg: CloudProviderArg) -> Self {
        match arg {
            CloudProviderArg::Aws => CloudProvider::Aws,
            CloudProviderArg::Azure => CloudProvider::Azure,
            CloudProviderArg::Gcp => CloudProvider::Gcp,
        }
    }
}
