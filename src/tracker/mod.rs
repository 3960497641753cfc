use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::{host_input::HostInputModule, ticker::TickerModule};
use events::TrackerEvent;
use processing::{controller::TrackingController, ProcessingModule};
use tokio::{
    io::{AsyncBufRead, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    store::{json_store::JsonFileStore, KeyValueStore},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod events;
pub mod processing;
pub mod session;
pub mod shutdown;

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub tick_interval: Duration,
    /// Largest amount of time a single flush can credit.
    pub max_flush: chrono::Duration,
    pub write_attempts: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            max_flush: chrono::Duration::minutes(15),
            write_attempts: 2,
        }
    }
}

/// Represents the starting point for the browser host. Events are read from stdin until the
/// browser closes it.
pub async fn start_tracker(dir: PathBuf, settings: TrackerSettings) -> Result<()> {
    let store = JsonFileStore::in_dir(&dir)?;
    info!("Tracking into {:?}", store.path());
    let input = BufReader::new(tokio::io::stdin());
    run_tracker(store, input, settings, DefaultClock).await
}

pub async fn run_tracker<S, R>(
    store: S,
    input: R,
    settings: TrackerSettings,
    clock: impl Clock + Clone,
) -> Result<()>
where
    S: KeyValueStore,
    R: AsyncBufRead + Unpin,
{
    let (sender, receiver) = mpsc::channel::<TrackerEvent>(EVENT_BUFFER);
    let shutdown_token = CancellationToken::new();

    let ticker = create_ticker(sender.clone(), &shutdown_token, &settings, clock.clone());
    let host_input = HostInputModule::new(sender, input, shutdown_token.clone());
    let processor = create_processor(store, receiver, &settings, clock);

    let (_, ticker_result, input_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        ticker.run(),
        host_input.run(),
        processor.run(),
    );

    if let Err(e) = ticker_result {
        error!("Ticker got an error {e:?}");
    }
    if let Err(e) = input_result {
        error!("Host input got an error {e:?}");
    }
    processing_result
}

fn create_ticker(
    sender: mpsc::Sender<TrackerEvent>,
    shutdown_token: &CancellationToken,
    settings: &TrackerSettings,
    clock: impl Clock,
) -> TickerModule {
    TickerModule::new(
        sender,
        shutdown_token.clone(),
        settings.tick_interval,
        Box::new(clock),
    )
}

fn create_processor<S: KeyValueStore>(
    store: S,
    receiver: mpsc::Receiver<TrackerEvent>,
    settings: &TrackerSettings,
    clock: impl Clock,
) -> ProcessingModule<TrackingController<S>> {
    let controller = TrackingController::new(store, Box::new(clock), settings);
    ProcessingModule::new(receiver, controller)
}
