//! `xfer copy <id> <source> <destination>` – one transfer with an explicit id.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;
use xfer_core::{ChannelSink, SinkEvent, TransferManager, TransferRequest};

use crate::cli::progress::ProgressPrinter;

pub async fn run_copy(
    manager: &TransferManager,
    id: String,
    source: String,
    destination: String,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SinkEvent>();
    let sink = Arc::new(ChannelSink::new(id.clone(), tx));
    manager.start_transfer(TransferRequest::new(id, source, destination), sink)?;

    let mut printer = ProgressPrinter::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        if let Some(line) = printer.render(&event, Instant::now()) {
            println!("{}", line);
        }
        if terminal {
            break;
        }
    }

    if printer.summary().failed > 0 {
        bail!("transfer failed");
    }
    Ok(())
}
