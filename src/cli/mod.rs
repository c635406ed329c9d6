//! CLI interface for avg-scalper
//!
//! Provides subcommands for:
//! - `run`: Replay ticks through every enabled strategy in paper mode
//! - `validate`: Check a configuration file
//! - `status`: Show persisted strategy state
//! - `resume`: Lift a suspension on a persisted strategy
//! - `config`: Show the effective configuration

mod run;
mod status;

pub use run::RunArgs;
pub use status::{ResumeArgs, StatusArgs};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "avg-scalper")]
#[command(about = "Stop-loss averaging scalper for KRW spot markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay ticks through every enabled strategy
    Run(RunArgs),
    /// Check a configuration file and exit
    Validate,
    /// Show persisted strategy state
    Status(StatusArgs),
    /// Lift a suspension and reset the loss streak
    Resume(ResumeArgs),
    /// Show the effective configuration
    Config,
}
