use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_stream::{wrappers::SplitStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::tracker::events::{StoreCommand, TrackerEvent};

/// One line of the browser to host protocol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    TabActivated {
        #[serde(default)]
        url: Option<Arc<str>>,
    },
    TabUpdated {
        #[serde(default)]
        url: Option<Arc<str>>,
    },
    Suspend,
    AddSite {
        site: String,
        #[serde(default)]
        project: Option<String>,
    },
    RemoveSite {
        site: String,
    },
    RenameSite {
        from: String,
        to: String,
    },
    ResetSite {
        site: String,
    },
    ResetProject {
        project: String,
    },
    ResetAll,
}

impl From<HostMessage> for TrackerEvent {
    fn from(value: HostMessage) -> Self {
        match value {
            HostMessage::TabActivated { url } | HostMessage::TabUpdated { url } => {
                TrackerEvent::ActiveTabChanged { url }
            }
            HostMessage::Suspend => TrackerEvent::Suspend,
            HostMessage::AddSite { site, project } => {
                TrackerEvent::Command(StoreCommand::AddSite { site, project })
            }
            HostMessage::RemoveSite { site } => {
                TrackerEvent::Command(StoreCommand::RemoveSite { site })
            }
            HostMessage::RenameSite { from, to } => {
                TrackerEvent::Command(StoreCommand::RenameSite { from, to })
            }
            HostMessage::ResetSite { site } => {
                TrackerEvent::Command(StoreCommand::ResetSite { site })
            }
            HostMessage::ResetProject { project } => {
                TrackerEvent::Command(StoreCommand::ResetProject { project })
            }
            HostMessage::ResetAll => TrackerEvent::Command(StoreCommand::ResetAll),
        }
    }
}

/// Reads newline delimited JSON messages sent by the browser. The end of input means the browser
/// is gone, so a final suspend is sent and the whole host shuts down.
pub struct HostInputModule<R> {
    next: mpsc::Sender<TrackerEvent>,
    input: R,
    shutdown: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> HostInputModule<R> {
    pub fn new(next: mpsc::Sender<TrackerEvent>, input: R, shutdown: CancellationToken) -> Self {
        Self {
            next,
            input,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<()> {
        // Raw lines, so that a line with invalid utf-8 is skipped like any other malformed one.
        let mut lines = SplitStream::new(self.input.split(b'\n'));
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                line = lines.next() => line,
            };

            let bytes = match line {
                Some(Ok(bytes)) => bytes,
                None => {
                    info!("Browser closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    error!("Failed to read from browser {e:?}");
                    break;
                }
            };

            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Ignoring message that is not utf-8: {e}");
                    continue;
                }
            };
            let Some(event) = parse_line(&line) else {
                continue;
            };
            debug!("Received {event:?}");
            if self.next.send(event).await.is_err() {
                return Ok(());
            }
        }

        let result = self.next.send(TrackerEvent::Suspend).await;
        self.shutdown.cancel();
        result.map_err(|e| anyhow::anyhow!("Processor is gone before suspend: {e}"))
    }
}

fn parse_line(line: &str) -> Option<TrackerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<HostMessage>(line) {
        Ok(message) => Some(message.into()),
        Err(e) => {
            warn!("Ignoring malformed message {line:?}: {e}");
            None
        }
    }
}
