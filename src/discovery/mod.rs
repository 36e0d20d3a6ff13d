//! Track discovery - builds tracks from the `tracks/` directory layout
//!
//! ```text
//! <root>/tracks/<track>/step<N>_<name>/
//!                                     tests/      -> step has tests
//!                                     regional/   -> step has regional resources
//! ```

use crate::core::{config::RunConfig, step::Step, track::Track};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const TRACKS_DIR: &str = "tracks";
pub const TESTS_DIR: &str = "tests";
pub const REGIONAL_DIR: &str = "regional";

/// Error types for discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid step directory pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Track '{track}' has no steps at progression level {level}")]
    ProgressionGap { track: String, level: usize },
}

/// Discovers tracks below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryTracker {
    root: PathBuf,
}

impl DirectoryTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tracks_dir(&self) -> PathBuf {
        self.root.join(TRACKS_DIR)
    }

    /// Gather every track with at least one included step, sorted by name
    #[tracing::instrument(skip(self, config), fields(root = %self.root.display()))]
    pub fn gather_tracks(&self, config: &RunConfig) -> Result<Vec<Track>, DiscoveryError> {
        let step_pattern = Regex::new(r"^step(\d+)_(.+)$")?;
        let tracks_dir = self.tracks_dir();

        let mut tracks = Vec::new();
        for track_dir in subdirectories(&tracks_dir)? {
            let Some(track_name) = dir_name(&track_dir) else {
                continue;
            };

            let (steps, levels) = discover_steps(&step_pattern, &track_name, &track_dir)?;
            check_contiguous(&track_name, &levels)?;

            let included: Vec<Step> = steps
                .into_iter()
                .filter(|step| config.includes_step(&track_name, &step.name))
                .collect();

            if included.is_empty() {
                debug!(track = %track_name, "No included steps, omitting track");
                continue;
            }

            let track = Track::from_steps(&track_name, &track_dir, included);
            debug!(
                track = %track.name,
                steps = track.steps_count,
                levels = track.step_progressions_count,
                "Discovered track"
            );
            tracks.push(track);
        }

        tracks.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Discovered {} tracks", tracks.len());
        Ok(tracks)
    }
}

/// Steps of one track directory in level then name order, plus the levels seen
fn discover_steps(
    step_pattern: &Regex,
    track_name: &str,
    track_dir: &Path,
) -> Result<(Vec<Step>, BTreeSet<usize>), DiscoveryError> {
    let mut steps = Vec::new();
    let mut levels = BTreeSet::new();

    for step_dir in subdirectories(track_dir)? {
        let Some(name) = dir_name(&step_dir) else {
            continue;
        };
        let Some(captures) = step_pattern.captures(&name) else {
            debug!(dir = %step_dir.display(), "Not a step directory, ignoring");
            continue;
        };
        let Ok(level) = captures[1].parse::<usize>() else {
            continue;
        };
        if level == 0 {
            debug!(dir = %step_dir.display(), "Progression levels start at 1, ignoring");
            continue;
        }

        let step = Step::new(&captures[2], track_name, level)
            .with_tests(step_dir.join(TESTS_DIR).is_dir())
            .with_regional_resources(step_dir.join(REGIONAL_DIR).is_dir())
            .with_dir(step_dir);

        levels.insert(level);
        steps.push(step);
    }

    steps.sort_by(|a, b| (a.progression_level, &a.name).cmp(&(b.progression_level, &b.name)));
    Ok((steps, levels))
}

fn check_contiguous(track_name: &str, levels: &BTreeSet<usize>) -> Result<(), DiscoveryError> {
    for (expected, level) in (1..).zip(levels) {
        if *level != expected {
            return Err(DiscoveryError::ProgressionGap {
                track: track_name.to_string(),
                level: expected,
            });
        }
    }
    Ok(())
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
