use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

use super::TrackerSettings;

/// Browser host. The browser starts it and talks to it over stdin.
#[derive(Parser)]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[command(flatten)]
    pub tracking: TrackingArgs,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

#[derive(Args, Debug, Clone)]
pub struct TrackingArgs {
    /// Seconds between periodic flushes of the active site.
    #[arg(long = "tick-interval", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_interval_secs: u64,
    /// Upper bound in seconds for what a single flush can credit.
    #[arg(long = "max-flush", default_value_t = 900, value_parser = clap::value_parser!(i64).range(1..=604_800))]
    pub max_flush_secs: i64,
    #[arg(long = "write-attempts", default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub write_attempts: u32,
}

impl From<&TrackingArgs> for TrackerSettings {
    fn from(args: &TrackingArgs) -> Self {
        Self {
            tick_interval: Duration::from_secs(args.tick_interval_secs),
            max_flush: chrono::Duration::seconds(args.max_flush_secs),
            write_attempts: args.write_attempts,
        }
    }
}
