//! CLI for the xfer transfer engine.

mod commands;
mod console;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xfer_core::config;
use xfer_core::{ManagerOptions, TransferManager};

use commands::{run_completions, run_copy, run_get, run_manpage, run_shell};

/// Top-level CLI for xfer.
#[derive(Debug, Parser)]
#[command(name = "xfer")]
#[command(about = "xfer: background file transfers with pause, resume and throttling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more assets into the download directory.
    Get {
        /// Source files; each is saved under its own file name.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Download directory (default: `download_dir` from config).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Throttle per transfer in bytes per second (0 = unlimited).
        #[arg(long, value_name = "BYTES_PER_SEC")]
        speed: Option<u64>,
    },

    /// Copy one source to an explicit destination under the given id.
    Copy {
        /// Transfer identifier.
        id: String,
        /// Source path.
        source: String,
        /// Destination path.
        destination: String,
        /// Throttle in bytes per second (0 = unlimited).
        #[arg(long, value_name = "BYTES_PER_SEC")]
        speed: Option<u64>,
    },

    /// Interactive console: start, pause, resume and cancel transfers by id.
    Shell {
        /// Throttle for new transfers in bytes per second (0 = unlimited).
        #[arg(long, value_name = "BYTES_PER_SEC")]
        speed: Option<u64>,
    },

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

fn build_manager(speed: Option<u64>) -> Result<(config::XferConfig, TransferManager)> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    let mut options = ManagerOptions::from_config(&cfg);
    if let Some(s) = speed {
        options.task.speed_limit_bytes_per_sec = s;
    }
    Ok((cfg, TransferManager::local(options)))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                sources,
                dir,
                speed,
            } => {
                let (cfg, manager) = build_manager(speed)?;
                let dir = match dir {
                    Some(d) => d,
                    None => cfg.resolved_download_dir()?,
                };
                run_get(&manager, &sources, &dir).await?;
            }
            CliCommand::Copy {
                id,
                source,
                destination,
                speed,
            } => {
                let (_, manager) = build_manager(speed)?;
                run_copy(&manager, id, source, destination).await?;
            }
            CliCommand::Shell { speed } => {
                let (_, manager) = build_manager(speed)?;
                run_shell(manager).await?;
            }
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Manpage => run_manpage()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
