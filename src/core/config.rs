//! Run configuration from YAML

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "trackflow.yaml";

/// Errors raised while loading or validating a run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Cloud provider selector, passed through to steppers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        }
    }
}

/// A parsed `#<stage>#<track>#<step>` whitelist token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistToken {
    pub stage: String,
    pub track: String,
    pub step: String,
}

impl WhitelistToken {
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.strip_prefix('#')?.split('#');
        let (stage, track, step) = (parts.next()?, parts.next()?, parts.next()?);

        if parts.next().is_some() || [stage, track, step].iter().any(|p| p.is_empty()) {
            return None;
        }

        Some(WhitelistToken {
            stage: stage.to_string(),
            track: track.to_string(),
            step: step.to_string(),
        })
    }
}

/// Configuration consumed by discovery and the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding the `tracks/` tree
    #[serde(default = "default_tracks_dir")]
    pub tracks_dir: PathBuf,

    /// Stage used to match whitelist tokens
    #[serde(default)]
    pub stage: String,

    /// Run every discovered step
    #[serde(default)]
    pub target_all: bool,

    /// Steps to run when not targeting all, `#<stage>#<track>#<step>`
    #[serde(default)]
    pub step_whitelist: Vec<String>,

    /// Destroy each track right after deploying it
    #[serde(default)]
    pub self_destroy: bool,

    /// Region of the primary run
    pub primary_region: String,

    /// Explicit target regions for regional runs
    #[serde(default)]
    pub target_regions: Vec<String>,

    /// Named region group used when no explicit targets are given
    #[serde(default)]
    pub region_group: Option<String>,

    /// Region groups by name
    #[serde(default)]
    pub region_groups: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub cloud_provider: CloudProvider,

    /// Per-step timeout (in seconds)
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Deadline for the whole run (in seconds)
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

fn default_tracks_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tracks_dir: default_tracks_dir(),
            stage: String::new(),
            target_all: false,
            step_whitelist: Vec::new(),
            self_destroy: false,
            primary_region: String::new(),
            target_regions: Vec::new(),
            region_group: None,
            region_groups: HashMap::new(),
            cloud_provider: CloudProvider::default(),
            step_timeout_secs: None,
            run_timeout_secs: None,
        }
    }
}

/// Find a config file when none is given explicitly
///
/// Looks for `trackflow.yaml` in `dir`, then in the user's config
/// directory (`~/.config/trackflow/trackflow.yaml` on Linux).
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let local = dir.join(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("trackflow").join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.is_file())
}

impl RunConfig {
    /// Load run configuration from a YAML file
    ///
    /// Relative `tracks_dir` values are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: RunConfig = serde_yaml::from_str(&content)?;
        if config.tracks_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.tracks_dir = parent.join(&config.tracks_dir);
            }
        }
        Ok(config)
    }

    /// Parse run configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the run configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_region.trim().is_empty() {
            return Err(ConfigError::Invalid("primary_region must be set".to_string()));
        }

        if !self.target_all && self.step_whitelist.is_empty() {
            return Err(ConfigError::Invalid(
                "either target_all or a step whitelist is required".to_string(),
            ));
        }

        for token in &self.step_whitelist {
            if WhitelistToken::parse(token).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "malformed whitelist token '{}', expected #<stage>#<track>#<step>",
                    token
                )));
            }
        }

        if let Some(group) = &self.region_group {
            if self.target_regions.is_empty() && !self.region_groups.contains_key(group) {
                return Err(ConfigError::Invalid(format!("unknown region group '{}'", group)));
            }
        }

        Ok(())
    }

    /// Target regions for regional runs, first occurrence of each region only
    pub fn target_regions(&self) -> Vec<String> {
        let configured = if !self.target_regions.is_empty() {
            self.target_regions.as_slice()
        } else {
            self.region_group
                .as_ref()
                .and_then(|group| self.region_groups.get(group))
                .map(Vec::as_slice)
                .unwrap_or_default()
        };

        let mut seen = HashSet::new();
        configured
            .iter()
            .filter(|region| seen.insert(region.as_str()))
            .cloned()
            .collect()
    }

    /// Whether a step passes the whitelist
    pub fn includes_step(&self, track_name: &str, step_name: &str) -> bool {
        if self.target_all {
            return true;
        }

        let token = format!("#{}#{}#{}", self.stage, track_name, step_name);
        self.step_whitelist.iter().any(|t| *t == token)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
