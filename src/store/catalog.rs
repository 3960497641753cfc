//! User-facing operations over the store: sites, projects, notes, to-dos, settings and backups.
//! None of these are time accounting, which belongs to the tracker alone.

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{
    entities::{NoteMap, ProjectMap, Theme, TodoItem, TodoMap, UiStateMap},
    keys::{self, ReservedKey},
    KeyValueStore,
};

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SiteTotal {
    pub rule: String,
    pub seconds: u64,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ProjectReport {
    pub name: String,
    pub sites: Vec<SiteTotal>,
    pub note: Option<String>,
    pub todos: Vec<TodoItem>,
    /// Collapsed projects are listed with their total only.
    pub open: bool,
}

impl ProjectReport {
    pub fn total(&self) -> u64 {
        self.sites.iter().map(|v| v.seconds).sum()
    }
}

/// Totals grouped the way the user organized them: projects in stored order followed by sites
/// that belong to no project.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct TimeReport {
    pub projects: Vec<ProjectReport>,
    pub unassigned: Vec<SiteTotal>,
}

impl TimeReport {
    pub fn total(&self) -> u64 {
        self.projects.iter().map(ProjectReport::total).sum::<u64>()
            + self.unassigned.iter().map(|v| v.seconds).sum::<u64>()
    }
}

pub struct Catalog<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> Catalog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned + Default>(&self, key: ReservedKey) -> Result<T> {
        match self.store.get(key.as_str()).await? {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Malformed value under {}", key.as_str())),
            None => Ok(T::default()),
        }
    }

    async fn save<T: Serialize>(&self, key: ReservedKey, value: &T) -> Result<()> {
        self.store
            .set(key.as_str(), serde_json::to_value(value)?)
            .await
    }

    async fn project_map(&self) -> Result<ProjectMap> {
        self.load(ReservedKey::Projects).await
    }

    async fn require_project(&self, name: &str) -> Result<ProjectMap> {
        let projects = self.project_map().await?;
        if !projects.contains_key(name) {
            bail!("Project {name} doesn't exist");
        }
        Ok(projects)
    }

    async fn require_site(&self, site: &str) -> Result<Value> {
        self.store
            .get(site)
            .await?
            .ok_or_else(|| anyhow!("Site {site} isn't tracked"))
    }

    pub async fn add_site(&self, site: &str, project: Option<&str>) -> Result<()> {
        let site = validate_rule(site)?;
        let mut projects = match project {
            Some(project) => Some(self.require_project(project).await?),
            None => None,
        };
        let mut changed = false;

        if self.store.get(site).await?.is_none() {
            self.store.set(site, Value::from(0u64)).await?;
            changed = true;
        }

        if let (Some(project), Some(projects)) = (project, projects.as_mut()) {
            let sites = projects.entry(project.to_owned()).or_default();
            if !sites.iter().any(|v| v == site) {
                sites.push(site.to_owned());
                self.save(ReservedKey::Projects, &*projects).await?;
                changed = true;
            }
        }

        if !changed {
            bail!("Site {site} is already tracked");
        }
        info!("Added site {site} to {project:?}");
        Ok(())
    }

    pub async fn remove_site(&self, site: &str) -> Result<()> {
        let site = validate_rule(site)?;
        let mut projects = self.project_map().await?;
        let mut assigned = false;
        for sites in projects.values_mut() {
            let before = sites.len();
            sites.retain(|v| v != site);
            assigned |= before != sites.len();
        }
        let tracked = self.store.get(site).await?.is_some();
        if !tracked && !assigned {
            bail!("Site {site} isn't tracked");
        }

        self.store.remove(site).await?;
        if assigned {
            self.save(ReservedKey::Projects, &projects).await?;
        }
        info!("Removed site {site}");
        Ok(())
    }

    pub async fn rename_site(&self, from: &str, to: &str) -> Result<()> {
        let from = validate_rule(from)?;
        let to = validate_rule(to)?;
        if self.store.get(to).await?.is_some() {
            bail!("Site {to} already exists");
        }
        let seconds = self.require_site(from).await?;

        let mut projects = self.project_map().await?;
        let mut assigned = false;
        for site in projects.values_mut().flatten() {
            if site == from {
                *site = to.to_owned();
                assigned = true;
            }
        }

        self.store.set(to, seconds).await?;
        if assigned {
            self.save(ReservedKey::Projects, &projects).await?;
        }
        self.store.remove(from).await?;
        info!("Renamed site {from} to {to}");
        Ok(())
    }

    pub async fn reset_site(&self, site: &str) -> Result<()> {
        let site = validate_rule(site)?;
        self.require_site(site).await?;
        self.store.set(site, Value::from(0u64)).await
    }

    /// Zeroes every site of a project. Returns the sites that were reset.
    pub async fn reset_project(&self, name: &str) -> Result<Vec<String>> {
        let projects = self.require_project(name).await?;
        let sites = projects.get(name).cloned().unwrap_or_default();
        for site in &sites {
            self.store.set(site, Value::from(0u64)).await?;
        }
        debug!("Reset {} sites of {name}", sites.len());
        Ok(sites)
    }

    /// Zeroes every tracked site. Returns the number of sites reset.
    pub async fn reset_all(&self) -> Result<usize> {
        let data = self.store.get_all().await?;
        let rules = keys::rule_keys(&data).collect::<Vec<_>>();
        for rule in &rules {
            self.store.set(rule, Value::from(0u64)).await?;
        }
        info!("Reset {} sites", rules.len());
        Ok(rules.len())
    }

    pub async fn add_project(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        let mut projects = self.project_map().await?;
        if projects.contains_key(name) {
            bail!("Project {name} already exists");
        }
        projects.insert(name.to_owned(), vec![]);
        self.save(ReservedKey::Projects, &projects).await
    }

    /// Removes a project together with its note and to-dos. Its sites keep their totals and show
    /// up as unassigned.
    pub async fn remove_project(&self, name: &str) -> Result<()> {
        let mut projects = self.require_project(name).await?;
        projects.shift_remove(name);
        self.save(ReservedKey::Projects, &projects).await?;

        let mut notes: NoteMap = self.load(ReservedKey::Notes).await?;
        if notes.shift_remove(name).is_some() {
            self.save(ReservedKey::Notes, &notes).await?;
        }
        let mut todos: TodoMap = self.load(ReservedKey::Todos).await?;
        if todos.shift_remove(name).is_some() {
            self.save(ReservedKey::Todos, &todos).await?;
        }
        Ok(())
    }

    pub async fn rename_project(&self, from: &str, to: &str) -> Result<()> {
        let to = validate_name(to)?;
        let mut projects = self.require_project(from).await?;
        if projects.contains_key(to) {
            bail!("Project {to} already exists");
        }
        rename_entry(&mut projects, from, to);
        self.save(ReservedKey::Projects, &projects).await?;

        let mut notes: NoteMap = self.load(ReservedKey::Notes).await?;
        if rename_entry(&mut notes, from, to) {
            self.save(ReservedKey::Notes, &notes).await?;
        }
        let mut todos: TodoMap = self.load(ReservedKey::Todos).await?;
        if rename_entry(&mut todos, from, to) {
            self.save(ReservedKey::Todos, &todos).await?;
        }
        Ok(())
    }

    /// Sets the note of a project. An empty note removes it.
    pub async fn set_note(&self, project: &str, text: &str) -> Result<()> {
        self.require_project(project).await?;
        let mut notes: NoteMap = self.load(ReservedKey::Notes).await?;
        if text.trim().is_empty() {
            notes.shift_remove(project);
        } else {
            notes.insert(project.to_owned(), text.to_owned());
        }
        self.save(ReservedKey::Notes, &notes).await
    }

    pub async fn add_todo(&self, project: &str, text: &str) -> Result<()> {
        self.require_project(project).await?;
        let text = text.trim();
        if text.is_empty() {
            bail!("To-do text can't be empty");
        }
        let mut todos: TodoMap = self.load(ReservedKey::Todos).await?;
        todos
            .entry(project.to_owned())
            .or_default()
            .push(TodoItem::new(text));
        self.save(ReservedKey::Todos, &todos).await
    }

    /// Flips the completion flag of a to-do and returns the new value.
    pub async fn toggle_todo(&self, project: &str, index: usize) -> Result<bool> {
        let mut todos: TodoMap = self.load(ReservedKey::Todos).await?;
        let item = todos
            .get_mut(project)
            .and_then(|v| v.get_mut(index))
            .ok_or_else(|| anyhow!("Project {project} has no to-do {index}"))?;
        item.done = !item.done;
        let done = item.done;
        self.save(ReservedKey::Todos, &todos).await?;
        Ok(done)
    }

    pub async fn remove_todo(&self, project: &str, index: usize) -> Result<TodoItem> {
        let mut todos: TodoMap = self.load(ReservedKey::Todos).await?;
        let list = todos
            .get_mut(project)
            .filter(|v| index < v.len())
            .ok_or_else(|| anyhow!("Project {project} has no to-do {index}"))?;
        let removed = list.remove(index);
        self.save(ReservedKey::Todos, &todos).await?;
        Ok(removed)
    }

    pub async fn set_ui_flag(&self, key: &str, value: bool) -> Result<()> {
        let mut state: UiStateMap = self.load(ReservedKey::UiState).await?;
        state.insert(key.to_owned(), value);
        self.save(ReservedKey::UiState, &state).await
    }

    pub async fn set_project_open(&self, project: &str, open: bool) -> Result<()> {
        self.require_project(project).await?;
        self.set_ui_flag(&open_flag(project), open).await
    }

    pub async fn set_timesheet_url(&self, value: &str) -> Result<()> {
        let value = value.trim();
        url::Url::parse(value).with_context(|| format!("{value} is not a valid URL"))?;
        self.save(ReservedKey::TimesheetUrl, &value).await
    }

    pub async fn timesheet_url(&self) -> Result<Option<String>> {
        self.load(ReservedKey::TimesheetUrl).await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.save(ReservedKey::Theme, &theme).await
    }

    pub async fn theme(&self) -> Result<Theme> {
        let theme: Option<Theme> = self.load(ReservedKey::Theme).await?;
        Ok(theme.unwrap_or(Theme::Light))
    }

    pub async fn report(&self) -> Result<TimeReport> {
        let data = self.store.get_all().await?;
        let projects: ProjectMap = parse_or_default(data.get(ReservedKey::Projects.as_str()));
        let notes: NoteMap = parse_or_default(data.get(ReservedKey::Notes.as_str()));
        let mut todos: TodoMap = parse_or_default(data.get(ReservedKey::Todos.as_str()));
        let ui_state: UiStateMap = parse_or_default(data.get(ReservedKey::UiState.as_str()));

        let site_total = |rule: &str| SiteTotal {
            rule: rule.to_owned(),
            seconds: keys::seconds_of(data.get(rule)),
        };

        let unassigned = keys::rule_keys(&data)
            .filter(|rule| !projects.values().flatten().any(|v| v == rule))
            .map(site_total)
            .collect();

        let projects = projects
            .iter()
            .map(|(name, sites)| ProjectReport {
                name: name.clone(),
                sites: sites.iter().map(|v| site_total(v)).collect(),
                note: notes.get(name).cloned(),
                todos: todos.shift_remove(name).unwrap_or_default(),
                open: ui_state.get(&open_flag(name)) != Some(&false),
            })
            .collect();

        Ok(TimeReport {
            projects,
            unassigned,
        })
    }

    pub async fn export_json(&self) -> Result<String> {
        let data = self.store.get_all().await?;
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Replaces the entire store with a previously exported document. Returns the number of keys
    /// imported.
    pub async fn import_json(&self, content: &str) -> Result<usize> {
        let data = serde_json::from_str::<Map<String, Value>>(content)
            .context("Backup must be a JSON object")?;
        let count = data.len();
        self.store.replace_all(data).await?;
        info!("Imported {count} keys");
        Ok(count)
    }
}

fn parse_or_default<T: DeserializeOwned + Default>(value: Option<&Value>) -> T {
    match value.map(|v| serde_json::from_value(v.clone())) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            warn!("Ignoring malformed reserved value: {e}");
            T::default()
        }
        None => T::default(),
    }
}

fn rename_entry<V>(map: &mut indexmap::IndexMap<String, V>, from: &str, to: &str) -> bool {
    let Some((index, _, value)) = map.shift_remove_full(from) else {
        return false;
    };
    map.shift_insert(index, to.to_owned(), value);
    true
}

fn open_flag(project: &str) -> String {
    format!("{project}_open")
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Name can't be empty");
    }
    Ok(name)
}

fn validate_rule(site: &str) -> Result<&str> {
    let site = validate_name(site)?;
    if keys::is_reserved(site) {
        bail!("{site} is a reserved key and can't be tracked");
    }
    Ok(site)
}
