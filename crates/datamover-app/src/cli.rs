use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line of the datamover daemon.
#[derive(Debug, Parser)]
#[command(
    name = "datamover",
    about = "Moves files out of an incoming directory without losing data"
)]
pub struct Cli {
    /// YAML configuration document; `DATAMOVER_*` variables override its fields.
    #[arg(long, global = true, env = "DATAMOVER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Command to run; defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Datamover commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Scan and move until interrupted.
    Run,
    /// Verify the external copy tool and exit.
    Check,
}

impl Cli {
    /// Selected command, falling back to [`Command::Run`].
    #[must_use]
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}
