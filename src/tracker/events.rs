use std::sync::Arc;

/// Everything the tracking controller reacts to. All of these travel through one channel, so
/// they are handled strictly in the order they were observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The foreground tab changed or navigated. `None` when the browser didn't report a url.
    ActiveTabChanged { url: Option<Arc<str>> },
    /// Periodic flush of the open window.
    Tick,
    /// The host is about to be torn down.
    Suspend,
    /// A user action that touches rule totals or the rule set.
    Command(StoreCommand),
}

/// User actions that are applied by the tracker itself, so they can never interleave with a
/// flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    AddSite {
        site: String,
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

impl StoreCommand {
    /// Whether the command can change which rule the active tab matches.
    pub fn changes_rules(&self) -> bool {
        matches!(
            self,
            StoreCommand::AddSite { .. }
                | StoreCommand::RemoveSite { .. }
                | StoreCommand::RenameSite { .. }
        )
    }
}
