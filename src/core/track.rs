//! Track domain model

use crate::core::step::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A deployable set of steps grouped into progression levels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    /// Track name
    pub name: String,

    /// Track directory
    pub dir: PathBuf,

    /// Highest progression level
    pub step_progressions_count: usize,

    /// Steps by progression level, keys are `1..=step_progressions_count`
    pub ordered_steps: BTreeMap<usize, Vec<Step>>,

    /// Whether any step carries regional resources
    pub regional_deployment: bool,

    /// Total number of steps across all levels
    pub steps_count: usize,

    /// Number of steps with a test suite
    pub steps_with_tests_count: usize,
}

impl Track {
    /// Build a track from its steps
    ///
    /// Steps are grouped by `progression_level` in the order given. Levels
    /// without steps below the highest level are kept as empty sequences.
    pub fn from_steps(name: impl Into<String>, dir: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        let step_progressions_count = steps.iter().map(|s| s.progression_level).max().unwrap_or(0);

        let mut ordered_steps: BTreeMap<usize, Vec<Step>> =
            (1..=step_progressions_count).map(|level| (level, Vec::new())).collect();

        let steps_count = steps.len();
        let steps_with_tests_count = steps.iter().filter(|s| s.tests_exist).count();
        let regional_deployment = steps.iter().any(|s| s.regional_resources_exist);

        for step in steps {
            ordered_steps.entry(step.progression_level).or_default().push(step);
        }

        Self {
            name: name.into(),
            dir: dir.into(),
            step_progressions_count,
            ordered_steps,
            regional_deployment,
            steps_count,
            steps_with_tests_count,
        }
    }

    /// Force regional deployment on or off
    pub fn with_regional_deployment(mut self, regional_deployment: bool) -> Self {
        self.regional_deployment = regional_deployment;
        self
    }

    /// Steps of one progression level
    pub fn steps_at(&self, level: usize) -> &[Step] {
        self.ordered_steps.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over every step in level order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.ordered_steps.values().flatten()
    }
}
