//! `xfer get <source>...` – download assets into a directory and wait for all of them.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use xfer_core::{ChannelSink, SinkEvent, TransferManager, TransferRequest};

use crate::cli::progress::ProgressPrinter;

pub async fn run_get(manager: &TransferManager, sources: &[PathBuf], dir: &Path) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SinkEvent>();

    let mut accepted = 0usize;
    for source in sources {
        let Some(request) = TransferRequest::for_asset(source, dir) else {
            eprintln!("skipping {}: no file name", source.display());
            continue;
        };
        let id = request.id.clone();
        let sink = Arc::new(ChannelSink::new(id.clone(), tx.clone()));
        match manager.start_transfer(request, sink) {
            Ok(_) => {
                accepted += 1;
                println!("{}: started -> {}", id, dir.display());
            }
            Err(e) => println!("{}", e),
        }
    }
    drop(tx);

    if accepted == 0 {
        return Ok(());
    }

    let mut printer = ProgressPrinter::new();
    while printer.summary().total() < accepted {
        let Some(event) = rx.recv().await else { break };
        if let Some(line) = printer.render(&event, Instant::now()) {
            println!("{}", line);
        }
    }

    let summary = printer.summary();
    println!(
        "{} completed, {} failed, {} cancelled",
        summary.completed, summary.failed, summary.cancelled
    );
    if summary.failed > 0 {
        bail!("{} transfer(s) failed", summary.failed);
    }
    Ok(())
}
