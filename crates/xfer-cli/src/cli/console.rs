//! Line parser for the interactive shell.

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Start {
        id: String,
        source: String,
        destination: String,
    },
    Pause(String),
    Resume(String),
    Cancel(String),
    Speed { id: String, bytes_per_sec: u64 },
    Status,
    Help,
    Exit,
}

pub const HELP: &str = "\
Available commands:
  start <taskId> <sourcePath> <destinationPath> - Start a new transfer
  pause <taskId> - Pause the transfer
  resume <taskId> - Resume the transfer
  cancel <taskId> - Cancel the transfer and delete the partial file
  speed <taskId> <bytesPerSec> - Change the throttle (0 = unlimited)
  status - List active transfers
  help - Show this help
  exit - Cancel everything and quit";

fn single_id(parts: &[&str], usage: &str) -> Result<String> {
    match parts {
        [_, id] => Ok((*id).to_string()),
        _ => bail!("Usage: {}", usage),
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`; malformed ones an error
/// carrying the usage text to show.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(cmd) = parts.first() else {
        return Ok(None);
    };

    let parsed = match cmd.to_ascii_lowercase().as_str() {
        "start" => match parts.as_slice() {
            [_, id, source, destination] => ShellCommand::Start {
                id: (*id).to_string(),
                source: (*source).to_string(),
                destination: (*destination).to_string(),
            },
            _ => bail!("Usage: start <taskId> <sourcePath> <destinationPath>"),
        },
        "pause" => ShellCommand::Pause(single_id(&parts, "pause <taskId>")?),
        "resume" => ShellCommand::Resume(single_id(&parts, "resume <taskId>")?),
        "cancel" => ShellCommand::Cancel(single_id(&parts, "cancel <taskId>")?),
        "speed" => match parts.as_slice() {
            [_, id, rate] => {
                let bytes_per_sec = rate
                    .parse::<u64>()
                    .map_err(|_| anyhow!("invalid speed {:?}; expected bytes per second", rate))?;
                ShellCommand::Speed {
                    id: (*id).to_string(),
                    bytes_per_sec,
                }
            }
            _ => bail!("Usage: speed <taskId> <bytesPerSec>"),
        },
        "status" => ShellCommand::Status,
        "help" => ShellCommand::Help,
        "exit" | "quit" => ShellCommand::Exit,
        other => bail!("Unknown command: {}. Type 'help' for the list.", other),
    };
    Ok(Some(parsed))
}
