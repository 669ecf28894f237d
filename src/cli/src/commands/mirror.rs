//! `a3s-mirror mirror` command.

use a3s_mirror_core::event::{EventEmitter, MirrorEvent};
use clap::Args;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::LocationArgs;
use crate::output::format_versions;

#[derive(Args)]
pub struct MirrorArgs {
    #[command(flatten)]
    pub location: LocationArgs,

    /// Compute the work list without copying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: MirrorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.location.to_config()?;
    config.dry_run |= args.dry_run;

    let events = EventEmitter::new(256);
    let printer = (!args.quiet).then(|| tokio::spawn(print_events(events.subscribe())));

    let pipeline = super::open_pipeline(&config)?
        .with_cancellation(super::cancel_on_ctrl_c())
        .with_report(events);

    if !args.quiet {
        println!("Mirroring {} -> {}", pipeline.source(), pipeline.destination());
    }

    let result = pipeline.run().await;

    // The pipeline holds the last emitter; dropping it closes the channel.
    drop(pipeline);
    finish_printer(printer).await;

    let report = result?;
    if args.quiet {
        return Ok(());
    }
    println!("Versions: {}", format_versions(&report.plan.versions));
    match (&report.archive, report.dry_run) {
        (_, true) => println!("Dry run: {} images would be copied", report.images.len()),
        (Some(archive), false) => println!(
            "Copied {} images into {}",
            report.images.len(),
            archive.display()
        ),
        (None, false) => println!("Copied {} images", report.images.len()),
    }

    Ok(())
}

/// Print events until every emitter is gone.
async fn print_events(mut rx: broadcast::Receiver<MirrorEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{}", event.describe()),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Progress output fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn finish_printer(printer: Option<JoinHandle<()>>) {
    if let Some(handle) = printer {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Progress printer failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_printer_drains_before_finishing() {
        let events = EventEmitter::new(4);
        let printer = Some(tokio::spawn(print_events(events.subscribe())));
        for i in 0..16 {
            events.emit(MirrorEvent::with_string("copy.completed", i.to_string()));
        }
        drop(events);

        tokio::time::timeout(std::time::Duration::from_secs(5), finish_printer(printer))
            .await
            .unwrap();
    }
}
