use super::IOArgs;
use clap::Subcommand;
use std::{path::PathBuf, time::Duration};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// The simulator's subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a fixed number of cycles over a network and report every one
    Clear {
        /// Where to read the network and write the reports
        #[command(flatten)]
        io: IOArgs,

        /// Time of the first cycle (RFC3339, defaults to now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<OffsetDateTime>,

        /// How many cycles to run
        #[arg(short = 'n', long, default_value_t = 3)]
        cycles: usize,

        /// Time between cycles, e.g. "5m" (defaults to repeating the same instant)
        #[arg(long, value_parser = parse_duration)]
        every: Option<Duration>,
    },

    /// Cycle a network on a schedule until interrupted
    Run {
        /// Path to the configuration file
        #[arg(short, long, env = "TNS_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn parse_instant(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

fn parse_duration(raw: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(raw)
}
