use serde_json::{Map, Value};

pub const PROJECTS_KEY: &str = "__projects__";
pub const NOTES_KEY: &str = "__notes__";
pub const TODOS_KEY: &str = "__todos__";
pub const UI_STATE_KEY: &str = "__ui_state__";
pub const TIMESHEET_URL_KEY: &str = "__timesheet_url__";
pub const THEME_KEY: &str = "__theme__";

/// Keys of the store that hold application data instead of a tracked site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedKey {
    Projects,
    Notes,
    Todos,
    UiState,
    TimesheetUrl,
    Theme,
}

impl ReservedKey {
    pub const ALL: [ReservedKey; 6] = [
        ReservedKey::Projects,
        ReservedKey::Notes,
        ReservedKey::Todos,
        ReservedKey::UiState,
        ReservedKey::TimesheetUrl,
        ReservedKey::Theme,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservedKey::Projects => PROJECTS_KEY,
            ReservedKey::Notes => NOTES_KEY,
            ReservedKey::Todos => TODOS_KEY,
            ReservedKey::UiState => UI_STATE_KEY,
            ReservedKey::TimesheetUrl => TIMESHEET_URL_KEY,
            ReservedKey::Theme => THEME_KEY,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == key)
    }
}

/// Classification of a raw store key. This is the only place that decides whether a key is a
/// tracking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey<'a> {
    Reserved(ReservedKey),
    Rule(&'a str),
}

impl<'a> StoreKey<'a> {
    pub fn classify(key: &'a str) -> Self {
        match ReservedKey::from_key(key) {
            Some(reserved) => StoreKey::Reserved(reserved),
            None => StoreKey::Rule(key),
        }
    }
}

pub fn is_reserved(key: &str) -> bool {
    matches!(StoreKey::classify(key), StoreKey::Reserved(_))
}

/// Iterates over the rule keys of a store snapshot in stored order.
pub fn rule_keys(data: &Map<String, Value>) -> impl Iterator<Item = &str> {
    data.keys().filter_map(|key| match StoreKey::classify(key) {
        StoreKey::Rule(rule) => Some(rule),
        StoreKey::Reserved(_) => None,
    })
}

/// Reads the accumulated seconds stored for a rule. Anything that isn't a non-negative integer
/// counts as no time at all.
pub fn seconds_of(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_u64).unwrap_or(0)
}
