// Browser host. Stdin carries one JSON message per line from the extension side, so nothing but
// logs may be written to the console.

use anyhow::Result;
use clap::Parser;
use sitetally::{
    tracker::{args::HostArgs, start_tracker, TrackerSettings},
    utils::{
        dir::{create_application_default_path, create_application_path},
        logging::{enable_logging, HOST_PREFIX},
        runtime::{run_to_completion, single_thread_runtime},
    },
};

fn main() -> Result<()> {
    run(HostArgs::parse())
}

fn run(args: HostArgs) -> Result<()> {
    let app_dir = match args.dir {
        Some(dir) => create_application_path(dir)?,
        None => create_application_default_path()?,
    };
    enable_logging(HOST_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    let settings = TrackerSettings::from(&args.tracking);
    run_to_completion(single_thread_runtime()?, start_tracker(app_dir, settings))
}
