#![warn(missing_docs)]
//! Simulate a network of transactive nodes.
//!
//! Every node of the network runs in this process and exchanges records
//! through an in-memory bus. `tnsim clear` runs a fixed number of cycles and
//! writes the reports; `tnsim run` keeps cycling on a schedule.

use clap::Parser;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::{Level, event};

mod io;
pub use io::IOArgs;

mod commands;
pub use commands::Commands;

mod config;
pub use config::AppConfig;

mod network;
pub use network::{CycleSummary, MeasurementSeed, Network, NetworkConfig};

mod schedule;
pub use schedule::Scheduler;

/// The top-level arguments: which subcommand to execute
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct BaseArgs {
    /// The subcommand
    #[command(subcommand)]
    pub command: Commands,
}

impl BaseArgs {
    /// Run the requested subcommand to completion
    pub async fn evaluate(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Clear {
                io,
                at,
                cycles,
                every,
            } => {
                let input = io.read()?;
                let config = serde_json::from_reader::<_, NetworkConfig>(input)?;
                let mut network = Network::build(config).await?;

                let start = at.unwrap_or_else(OffsetDateTime::now_utc);
                let step = every.unwrap_or(Duration::ZERO);
                let shutdown = AtomicBool::new(false);
                let summaries = network.simulate(start, step, cycles, &shutdown).await?;

                let output = io.write()?;
                serde_json::to_writer_pretty(output, &summaries)?;
            }
            Commands::Run { config } => {
                let AppConfig {
                    network,
                    schedule,
                    report,
                } = AppConfig::load(config.as_deref())?;
                if schedule.every.is_none() {
                    return Err(CliError::NoSchedule.into());
                }
                let mut network = Network::build(network).await?;

                let (shutdown, stop) = watch_for_interrupt();
                let cycles = schedule.schedule(async |now: OffsetDateTime| {
                    let summary = network.cycle(now, &shutdown).await?;
                    summary.log();
                    if let Some(path) = &report {
                        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
                        serde_json::to_writer_pretty(file, &summary)?;
                    }
                    anyhow::Ok(())
                });

                tokio::select! {
                    result = cycles => match result {
                        Err(err) if shutdown.load(Ordering::Relaxed) => {
                            event!(Level::INFO, reason = %err, "stopped");
                        }
                        other => other?,
                    },
                    _ = stop.notified() => {
                        event!(Level::INFO, "interrupted, shutting down");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Raise a shutdown flag on Ctrl-C.
///
/// The flag stops a balance that is in progress; the notification wakes a
/// scheduler that is waiting for its next tick.
fn watch_for_interrupt() -> (Arc<AtomicBool>, Arc<Notify>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(Notify::new());
    let (flag, notify) = (shutdown.clone(), stop.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::Relaxed);
            notify.notify_one();
        }
    });
    (shutdown, stop)
}

/// Usage mistakes the argument parser cannot catch
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    /// `run` without `schedule.every` would never cycle
    #[error("no schedule configured, set schedule.every")]
    NoSchedule,
}
