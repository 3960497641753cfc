use anyhow::Result;

use crate::tracker::events::TrackerEvent;

/// Represents an event processor. The tracking controller is the only real one; the trait keeps
/// the event loop independent of it.
pub trait EventProcessor {
    fn process_next(&mut self, event: TrackerEvent) -> impl std::future::Future<Output = Result<()>>;

    /// Called once after the last event, when every sender is gone.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
