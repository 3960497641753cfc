use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, trace};

use super::events::TrackerEvent;

pub mod controller;
pub mod module;

/// Single consumer of tracker events. Events are handled one at a time and to completion, which
/// makes the processor the only writer of tracked time in the process.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            let description = format!("{event:?}");
            match self.processor.process_next(event).await {
                Ok(_) => {
                    trace!("Processed event {description}")
                }
                Err(e) => {
                    error!("Error processing event {description}: {e:?}")
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
