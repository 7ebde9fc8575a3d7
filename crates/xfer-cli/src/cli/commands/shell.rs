//! `xfer shell` – interactive console over a single manager.
//!
//! Commands are read line by line from stdin while a background task prints
//! sink events as they arrive. `exit` (or EOF) cancels whatever is still running.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use xfer_core::{ChannelSink, SinkEvent, TransferManager, TransferRequest};

use crate::cli::console::{parse_line, ShellCommand, HELP};
use crate::cli::progress::{format_snapshot, ProgressPrinter};

pub async fn run_shell(manager: TransferManager) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SinkEvent>();
    let printer_handle = tokio::spawn(async move {
        let mut printer = ProgressPrinter::new();
        while let Some(event) = rx.recv().await {
            if let Some(line) = printer.render(&event, Instant::now()) {
                println!("{}", line);
            }
        }
    });

    println!("Welcome to xfer!");
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let command = match parse_line(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        if command == ShellCommand::Exit {
            break;
        }
        execute(&manager, command, &tx);
    }

    println!("Shutting down...");
    let m = manager.clone();
    tokio::task::spawn_blocking(move || m.shutdown())
        .await
        .context("shutdown worker panicked")?;
    drop(tx);
    let _ = printer_handle.await;
    println!("Goodbye!");
    Ok(())
}

fn execute(
    manager: &TransferManager,
    command: ShellCommand,
    tx: &tokio::sync::mpsc::UnboundedSender<SinkEvent>,
) {
    let outcome = match command {
        ShellCommand::Start {
            id,
            source,
            destination,
        } => {
            let sink = Arc::new(ChannelSink::new(id.clone(), tx.clone()));
            manager
                .start_transfer(TransferRequest::new(id.clone(), source, destination), sink)
                .map(|_| format!("Task {} started.", id))
                .map_err(anyhow::Error::from)
        }
        ShellCommand::Pause(id) => manager
            .pause_transfer(&id)
            .map(|_| format!("Task {} paused.", id))
            .map_err(anyhow::Error::from),
        ShellCommand::Resume(id) => manager
            .resume_transfer(&id)
            .map(|_| format!("Task {} resumed.", id))
            .map_err(anyhow::Error::from),
        ShellCommand::Cancel(id) => manager
            .cancel_transfer(&id)
            .map(|_| format!("Task {} cancelled.", id))
            .map_err(anyhow::Error::from),
        ShellCommand::Speed { id, bytes_per_sec } => manager
            .set_speed(&id, bytes_per_sec)
            .map(|_| format!("Task {} speed set to {} B/s.", id, bytes_per_sec))
            .map_err(anyhow::Error::from),
        ShellCommand::Status => {
            let rows = manager.list();
            if rows.is_empty() {
                Ok("No active transfers.".to_string())
            } else {
                Ok(rows.iter().map(format_snapshot).collect::<Vec<_>>().join("\n"))
            }
        }
        ShellCommand::Help => Ok(HELP.to_string()),
        ShellCommand::Exit => Ok(String::new()),
    };
    match outcome {
        Ok(msg) if msg.is_empty() => {}
        Ok(msg) => println!("{}", msg),
        Err(e) => println!("{}", e),
    }
}
