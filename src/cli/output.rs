//! CLI output formatting

use crate::{
    core::{
        execution::{Output, RegionExecution, TrackRun},
        step::RegionDeployType,
        track::Track,
    },
    execution::RunEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over `total` tracks
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tracks {msg}";
    let bar_style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(bar_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run event for display
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted { run_id, tracks } => format!(
            "{} Starting run {} over {} tracks",
            ROCKET,
            style(short_id(&run_id.to_string())).dim(),
            style(tracks).cyan()
        ),
        RunEvent::TrackFinished {
            name,
            failures,
            failed_tests,
        } => {
            if *failures == 0 {
                format!("{} {}", CHECK, style(name).green())
            } else {
                format!(
                    "{} {} ({} failed, {} failed tests)",
                    CROSS,
                    style(name).red(),
                    failures,
                    failed_tests
                )
            }
        }
        RunEvent::RunCompleted { run_id, failures } => {
            let status = if *failures == 0 {
                format!("{} completed", style("successfully").green())
            } else {
                style(format!("failed with {} failures", failures)).red().to_string()
            };
            format!("{} Run ({}) {}", INFO, style(short_id(&run_id.to_string())).dim(), status)
        }
    }
}

/// Format the result of one track, one line per region run
pub fn format_track_run(run: &TrackRun) -> String {
    let icon = if run.failure_count() == 0 { CHECK } else { CROSS };
    let mut lines = vec![format!("{} {}", icon, style(&run.name).bold())];

    if let Some(error) = &run.error {
        lines.push(format!("    {}", style(error).red()));
    }
    if let Some(deploy) = &run.deploy {
        lines.extend(format_pass("deploy", deploy));
    }
    if let Some(destroy) = &run.destroy {
        lines.extend(format_pass("destroy", destroy));
    }

    lines.join("\n")
}

fn format_pass(label: &str, output: &Output) -> Vec<String> {
    let mut lines = vec![format!("  {}", style(label).cyan())];
    lines.extend(output.executions.iter().map(format_region_run));
    lines
}

fn format_region_run(execution: &RegionExecution) -> String {
    let result = &execution.output;
    let icon = if result.has_failed() {
        CROSS
    } else if result.cancelled {
        WARN
    } else {
        CHECK
    };
    let kind = match execution.region_deploy_type {
        RegionDeployType::Primary => style("primary").bold().to_string(),
        RegionDeployType::Regional => style("regional").dim().to_string(),
    };

    let mut line = format!(
        "    {}{} ({}) - {} steps",
        icon,
        execution.region,
        kind,
        result.step_outputs.len()
    );
    if let (Some(started), Some(completed)) = (result.started_at, result.completed_at) {
        if let Ok(duration) = completed.signed_duration_since(started).to_std() {
            line.push_str(&format!(" in {}", style(format_duration(duration)).dim()));
        }
    }
    if result.cancelled {
        line.push_str(&format!(" {}", style("cancelled").yellow()));
    }
    for failed in result.failed_steps() {
        let stage = failed
            .failed_stage
            .map(|stage| format!("{:?}", stage).to_lowercase())
            .unwrap_or_default();
        line.push_str(&format!(
            "\n      {} {} [{}]: {}",
            CROSS,
            style(&failed.step_name).red(),
            stage,
            style(failed.error.as_deref().unwrap_or("")).dim()
        ));
    }
    line
}

/// Format a discovered track for listing
pub fn format_track(track: &Track) -> String {
    let mut lines = vec![format!(
        "  {} ({} steps, {} with tests{})",
        style(&track.name).bold(),
        style(track.steps_count).cyan(),
        track.steps_with_tests_count,
        if track.regional_deployment { ", regional" } else { "" }
    )];

    for (level, steps) in &track.ordered_steps {
        let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        lines.push(format!("    {} {}", style(format!("{}:", level)).dim(), names.join(", ")));
    }

    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::Step;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_track_lists_levels() {
        console::set_colors_enabled(false);
        let track = Track::from_steps(
            "track-a",
            "tracks/track-a",
            vec![Step::new("a11", "track-a", 1), Step::new("a12", "track-a", 1), Step::new("a21", "track-a", 2)],
        );

        let text = format_track(&track);
        assert!(text.contains("track-a"));
        assert!(text.contains("1: a11, a12"));
        assert!(text.contains("2: a21"));
    }

    #[test]
    fn test_format_aborted_track() {
        console::set_colors_enabled(false);
        let run = TrackRun {
            name: "track-a".to_string(),
            error: Some("task panicked".to_string()),
            ..Default::default()
        };

        let text = format_track_run(&run);
        assert!(text.contains("track-a"));
        assert!(text.contains("task panicked"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
