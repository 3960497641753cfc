use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Project name to the ordered list of rules assigned to it.
pub type ProjectMap = IndexMap<String, Vec<String>>;

/// Project name to free text.
pub type NoteMap = IndexMap<String, String>;

/// Project name to its to-do list.
pub type TodoMap = IndexMap<String, Vec<TodoItem>>;

/// Collapse/expand flags of the user interface, e.g. `"Work_open": false`.
pub type UiStateMap = IndexMap<String, bool>;

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TodoItem {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl TodoItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}
