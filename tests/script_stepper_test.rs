//! Runs real step scripts from a discovered `tracks/` tree
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use trackflow::core::config::{CloudProvider, RunConfig};
use trackflow::core::execution::CancellationFlag;
use trackflow::core::step::StepStage;
use trackflow::discovery::DirectoryTracker;
use trackflow::execution::default_orchestrator;
use trackflow::stepper::ScriptStepperFactory;

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn run_config(root: &TempDir, regions: &[&str]) -> RunConfig {
    RunConfig {
        tracks_dir: root.path().to_path_buf(),
        primary_region: "us-east-1".to_string(),
        target_all: true,
        target_regions: regions.iter().map(|r| r.to_string()).collect(),
        cloud_provider: CloudProvider::Gcp,
        ..Default::default()
    }
}

/// `network` creates a vpc in every region; `app` records what it was given
fn network_fixture() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let track = root.path().join("tracks/network");

    write_script(
        &track.join("step1_vpc/deploy.sh"),
        "echo \"creating vpc in $REGION\"\necho \"{\\\"vpc_id\\\": \\\"vpc-$REGION\\\", \\\"cloud\\\": \\\"$CLOUD_PROVIDER\\\"}\"\n",
    );
    write_script(
        &track.join("step1_vpc/regional/deploy.sh"),
        "echo \"{\\\"peer\\\": \\\"$REGION\\\", \\\"kind\\\": \\\"$REGION_DEPLOY_TYPE\\\"}\"\n",
    );
    write_script(
        &track.join("step2_app/deploy.sh"),
        "printf '%s' \"$STEP_OUTPUT_VARIABLES\" > seen.json\necho '{\"replicas\": 3}'\n",
    );
    write_script(&track.join("step2_app/tests/run.sh"), "test -f seen.json\n");

    root
}

#[tokio::test]
async fn test_scripts_share_output_variables() {
    let root = network_fixture();
    let config = run_config(&root, &["us-west-2"]);
    let tracks = DirectoryTracker::new(root.path()).gather_tracks(&config).unwrap();

    let output = default_orchestrator(None)
        .deploy(
            tracks,
            &config,
            Arc::new(ScriptStepperFactory::new(config.cloud_provider)),
            CancellationFlag::new(),
        )
        .await;

    assert!(output.is_success(), "{:#?}", output);
    let deploy = output.track("network").unwrap().deploy.as_ref().unwrap();
    assert_eq!(deploy.executions.len(), 2);

    let primary = &deploy.primary_step_output_variables;
    assert_eq!(primary["vpc"]["vpc_id"], "vpc-us-east-1");
    assert_eq!(primary["vpc"]["cloud"], "gcp");
    assert_eq!(primary["app"]["replicas"], "3");

    let regional = &deploy.executions[1].output.step_output_variables;
    assert_eq!(regional["vpc-regional"]["peer"], "us-west-2");
    assert_eq!(regional["vpc-regional"]["kind"], "Regional");
    // Steps without regional resources do nothing in regional runs
    assert!(regional["app-regional"].is_empty());

    // Only the primary run executed the app script
    let seen = fs::read_to_string(root.path().join("tracks/network/step2_app/seen.json")).unwrap();
    let seen: serde_json::Value = serde_json::from_str(&seen).unwrap();
    assert_eq!(seen["vpc"]["vpc_id"], "vpc-us-east-1");
}

#[tokio::test]
async fn test_failing_script_reports_stderr() {
    let root = tempfile::tempdir().unwrap();
    write_script(
        &root.path().join("tracks/broken/step1_db/deploy.sh"),
        "echo 'quota exceeded' >&2\nexit 2\n",
    );
    let config = run_config(&root, &[]);
    let tracks = DirectoryTracker::new(root.path()).gather_tracks(&config).unwrap();

    let output = default_orchestrator(None)
        .deploy(
            tracks,
            &config,
            Arc::new(ScriptStepperFactory::new(config.cloud_provider)),
            CancellationFlag::new(),
        )
        .await;

    assert_eq!(output.failure_count(), 1);
    let primary = &output.tracks[0].deploy.as_ref().unwrap().executions[0];
    let step = &primary.output.step_outputs[0];
    assert_eq!(step.failed_stage, Some(StepStage::Provision));
    let error = step.error.as_deref().unwrap();
    assert!(error.contains("exited with code 2"));
    assert!(error.contains("quota exceeded"));
}

#[tokio::test]
async fn test_failing_tests_are_test_failures() {
    let root = tempfile::tempdir().unwrap();
    let step = root.path().join("tracks/checks/step1_bucket");
    write_script(&step.join("deploy.sh"), "echo '{\"bucket\": \"logs\"}'\n");
    write_script(&step.join("tests/run.sh"), "exit 1\n");
    let config = run_config(&root, &[]);
    let tracks = DirectoryTracker::new(root.path()).gather_tracks(&config).unwrap();

    let output = default_orchestrator(None)
        .deploy(
            tracks,
            &config,
            Arc::new(ScriptStepperFactory::new(config.cloud_provider)),
            CancellationFlag::new(),
        )
        .await;

    assert_eq!(output.failure_count(), 1);
    assert_eq!(output.failed_test_count(), 1);
}

#[tokio::test]
async fn test_cancellation_kills_running_script() {
    let root = tempfile::tempdir().unwrap();
    write_script(&root.path().join("tracks/slow/step1_wait/deploy.sh"), "sleep 30\n");
    let config = run_config(&root, &[]);
    let tracks = DirectoryTracker::new(root.path()).gather_tracks(&config).unwrap();

    let cancel = CancellationFlag::new();
    let _timer = cancel.cancel_after(Duration::from_millis(200));
    let started = tokio::time::Instant::now();

    let output = default_orchestrator(None)
        .deploy(
            tracks,
            &config,
            Arc::new(ScriptStepperFactory::new(config.cloud_provider)),
            cancel,
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(output.failure_count(), 1);
    let primary = &output.tracks[0].deploy.as_ref().unwrap().executions[0];
    assert_eq!(primary.output.step_outputs[0].error.as_deref(), Some("Cancelled"));
}

#[tokio::test]
async fn test_self_destroy_runs_destroy_scripts() {
    let root = network_fixture();
    write_script(
        &root.path().join("tracks/network/step1_vpc/destroy.sh"),
        "printf '%s' \"$STEP_OUTPUT_VARIABLES\" > destroyed.json\n",
    );
    let mut config = run_config(&root, &[]);
    config.self_destroy = true;
    let tracks = DirectoryTracker::new(root.path()).gather_tracks(&config).unwrap();

    let output = default_orchestrator(None)
        .deploy(
            tracks,
            &config,
            Arc::new(ScriptStepperFactory::new(config.cloud_provider)),
            CancellationFlag::new(),
        )
        .await;

    assert!(output.is_success(), "{:#?}", output);
    let destroyed = fs::read_to_string(root.path().join("tracks/network/step1_vpc/destroyed.json")).unwrap();
    let destroyed: serde_json::Value = serde_json::from_str(&destroyed).unwrap();
    assert_eq!(destroyed["vpc"]["vpc_id"], "vpc-us-east-1");
    assert_eq!(destroyed["app"]["replicas"], "3");
}
