use std::{future::Future, time::Duration};

use anyhow::Result;
use tokio::runtime::Runtime;

/// How long a finished program waits for leftover blocking work, like a stdin read that only
/// returns with the next line.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// The tracker is a single writer, so one thread is all it needs.
pub fn single_thread_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

pub fn multi_thread_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Runs `future` to completion, then shuts the runtime down without waiting for blocking tasks
/// longer than [SHUTDOWN_GRACE].
pub fn run_to_completion<F: Future>(runtime: Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}
