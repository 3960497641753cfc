use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{tracker::events::TrackerEvent, utils::clock::Clock};

/// Produces [TrackerEvent::Tick] on a fixed period. Ticks only schedule flushes, the amount
/// credited is always derived from wall-clock time by the controller.
pub struct TickerModule {
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
    interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl TickerModule {
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
        interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            shutdown,
            interval,
            time_provider,
        }
    }

    /// Executes the ticker loop until shutdown or until the processor goes away.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        loop {
            tick_point += self.interval;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }

            // After a suspend there is no point in firing every missed tick.
            let now = self.time_provider.instant();
            if now > tick_point + self.interval {
                debug!("Ticker woke up {:?} late", now - tick_point);
                tick_point = now;
            }

            match self.next.try_send(TrackerEvent::Tick) {
                Ok(()) => trace!("Sent tick"),
                Err(TrySendError::Full(_)) => debug!("Processor is busy, skipping tick"),
                Err(TrySendError::Closed(_)) => return Ok(()),
            }
        }
    }
}
