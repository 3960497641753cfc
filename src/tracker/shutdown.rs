use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels the token on ctrl-c. Returns early when something else cancelled it, like the browser
/// closing stdin.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
