//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{DeployCommand, DestroyCommand, ListCommand, ValidateCommand};
use std::ffi::OsString;

/// Multi-region infrastructure deployment track orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "trackflow")]
#[command(version = "0.1.0")]
#[command(about = "Deploy infrastructure tracks across a primary region and target regions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Deploy tracks, optionally destroying them afterwards
    Deploy(DeployCommand),

    /// Destroy tracks
    Destroy(DestroyCommand),

    /// List discovered tracks
    List(ListCommand),

    /// Validate a run configuration and the tracks it selects
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
