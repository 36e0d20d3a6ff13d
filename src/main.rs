use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use trackflow::cli::commands::{DeployCommand, DestroyCommand, ListCommand, RunArgs, TargetArgs, ValidateCommand};
use trackflow::cli::output::*;
use trackflow::cli::{Cli, Command};
use trackflow::core::config::{find_config_file, RunConfig};
use trackflow::core::execution::{CancellationFlag, RunOutput};
use trackflow::core::track::Track;
use trackflow::discovery::DirectoryTracker;
use trackflow::execution::{default_orchestrator, RunEvent};
use trackflow::stepper::{NoopStepperFactory, ScriptStepperFactory, StepperFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Deploy,
    Destroy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    let success = match &cli.command {
        Command::Deploy(cmd) => deploy_tracks(cmd).await?,
        Command::Destroy(cmd) => destroy_tracks(cmd).await?,
        Command::List(cmd) => list_tracks(cmd)?,
        Command::Validate(cmd) => validate_config(cmd)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Load the config file (explicit or discovered) and apply CLI overrides
fn load_config(target: &TargetArgs) -> Result<RunConfig> {
    let path = target.config.clone().or_else(|| find_config_file(Path::new(".")));

    let mut config = match path {
        Some(path) => RunConfig::from_file(&path)
            .with_context(|| format!("Failed to load run config {}", path.display()))?,
        None => RunConfig::default(),
    };

    target.apply(&mut config);
    Ok(config)
}

fn discover(config: &RunConfig) -> Result<Vec<Track>> {
    DirectoryTracker::new(&config.tracks_dir)
        .gather_tracks(config)
        .with_context(|| format!("Failed to discover tracks in {}", config.tracks_dir.display()))
}

async fn deploy_tracks(cmd: &DeployCommand) -> Result<bool> {
    let mut config = load_config(&cmd.target)?;
    cmd.run.apply(&mut config);
    if cmd.self_destroy {
        config.self_destroy = true;
    }
    config.validate().context("Invalid run configuration")?;

    let tracks = discover(&config)?;
    execute(Pass::Deploy, tracks, &config, &cmd.run).await
}

async fn destroy_tracks(cmd: &DestroyCommand) -> Result<bool> {
    let mut config = load_config(&cmd.target)?;
    cmd.run.apply(&mut config);
    config.self_destroy = false;
    config.validate().context("Invalid run configuration")?;

    let tracks = discover(&config)?;
    execute(Pass::Destroy, tracks, &config, &cmd.run).await
}

async fn execute(pass: Pass, tracks: Vec<Track>, config: &RunConfig, args: &RunArgs) -> Result<bool> {
    if !args.json {
        let target_regions = config.target_regions();
        println!(
            "{} {:?} of {} tracks: primary {}, regional [{}]{}",
            ROCKET,
            pass,
            style(tracks.len()).cyan(),
            style(&config.primary_region).bold(),
            target_regions.join(", "),
            if args.dry_run { " (dry run)" } else { "" }
        );
    }

    let stepper_factory: Arc<dyn StepperFactory> = if args.dry_run {
        Arc::new(NoopStepperFactory)
    } else {
        Arc::new(ScriptStepperFactory::new(config.cloud_provider))
    };

    // Ctrl-C stops scheduling and kills running step scripts
    let cancel = CancellationFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    let progress = if args.json {
        indicatif::ProgressBar::hidden()
    } else {
        create_progress_bar(tracks.len())
    };
    let bar = progress.clone();
    let orchestrator = default_orchestrator(config.step_timeout()).with_event_handler(move |event| {
        if let RunEvent::TrackFinished { .. } = event {
            bar.inc(1);
        }
        bar.println(format_run_event(&event));
    });

    let output = match pass {
        Pass::Deploy => orchestrator.deploy(tracks, config, stepper_factory, cancel).await,
        Pass::Destroy => orchestrator.destroy(tracks, config, stepper_factory, cancel).await,
    };

    progress.finish_and_clear();
    interrupt.abort();

    print_run_output(&output, args.json)?;
    Ok(output.is_success())
}

fn print_run_output(output: &RunOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(output)?);
        return Ok(());
    }

    let mut tracks: Vec<_> = output.tracks.iter().collect();
    tracks.sort_by(|a, b| a.name.cmp(&b.name));

    println!();
    for run in tracks {
        println!("{}", format_track_run(run));
    }

    if output.is_success() {
        println!(
            "\n{} {} tracks completed {}",
            CHECK,
            output.tracks.len(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} failed steps ({} in tests)",
            CROSS,
            style(output.failure_count()).red(),
            output.failed_test_count()
        );
    }
    Ok(())
}

fn list_tracks(cmd: &ListCommand) -> Result<bool> {
    let mut config = load_config(&cmd.target)?;
    if config.step_whitelist.is_empty() {
        config.target_all = true;
    }

    let tracks = discover(&config)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(true);
    }

    if tracks.is_empty() {
        println!("{} No tracks found in {}", INFO, config.tracks_dir.display());
        return Ok(true);
    }

    println!("{} Tracks in {}:", INFO, config.tracks_dir.display());
    for track in &tracks {
        println!("{}", format_track(track));
    }
    Ok(true)
}

fn validate_config(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating run configuration...", INFO);

    let result = load_config(&cmd.target).and_then(|config| {
        config.validate()?;
        let tracks = discover(&config)?;
        Ok((config, tracks))
    });

    match result {
        Ok((config, tracks)) => {
            println!("{} Run configuration is valid!", CHECK);
            println!("  Primary region: {}", style(&config.primary_region).bold());
            println!("  Target regions: {}", style(config.target_regions().join(", ")).cyan());
            println!("  Tracks: {}", style(tracks.len()).cyan());
            println!(
                "  Steps: {}",
                style(tracks.iter().map(|t| t.steps_count).sum::<usize>()).cyan()
            );
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(false)
        }
    }
}
