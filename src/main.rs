use anyhow::Result;
use sitetally::{
    cli::run_cli,
    utils::runtime::{multi_thread_runtime, run_to_completion},
};
use tracing::error;

fn main() -> Result<()> {
    // `serve` reads stdin on a blocking thread, so the runtime must not wait for it on exit.
    run_to_completion(multi_thread_runtime()?, run_cli()).inspect_err(|e| {
        error!("Error running cli {e:?}");
    })?;
    Ok(())
}
