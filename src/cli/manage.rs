use std::io::Write;

use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::store::{catalog::Catalog, KeyValueStore};

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    #[command(
        about = "Start tracking a site. Plain domains also match their subdomains, patterns with * match the whole URL"
    )]
    Add {
        site: String,
        #[arg(short, long, help = "Project to put the site in")]
        project: Option<String>,
    },
    #[command(about = "Stop tracking a site and forget its time")]
    Remove { site: String },
    #[command(about = "Rename a site keeping its time and project")]
    Rename { from: String, to: String },
    #[command(about = "Reset the time of a site")]
    Reset { site: String },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add {
        name: String,
    },
    #[command(about = "Remove a project. Its sites stay tracked")]
    Remove {
        name: String,
    },
    Rename {
        from: String,
        to: String,
    },
    #[command(about = "Reset the time of every site in a project")]
    Reset {
        name: String,
    },
    #[command(about = "Show only the total of a project in reports")]
    Collapse {
        name: String,
    },
    Expand {
        name: String,
    },
}

/// To-dos are numbered from 1, the way reports print them.
#[derive(Subcommand, Debug)]
pub enum TodoCommand {
    Add {
        project: String,
        #[arg(num_args = 1..)]
        text: Vec<String>,
    },
    #[command(about = "Mark a to-do as done or not done")]
    Toggle { project: String, number: usize },
    Remove { project: String, number: usize },
}

pub async fn process_site_command<S: KeyValueStore + ?Sized>(
    catalog: &Catalog<'_, S>,
    command: SiteCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        SiteCommand::Add { site, project } => {
            catalog.add_site(&site, project.as_deref()).await?;
            writeln!(out, "Tracking {site}")?;
        }
        SiteCommand::Remove { site } => {
            catalog.remove_site(&site).await?;
            writeln!(out, "Removed {site}")?;
        }
        SiteCommand::Rename { from, to } => {
            catalog.rename_site(&from, &to).await?;
            writeln!(out, "Renamed {from} to {to}")?;
        }
        SiteCommand::Reset { site } => {
            catalog.reset_site(&site).await?;
            writeln!(out, "Reset {site}")?;
        }
    }
    Ok(())
}

pub async fn process_project_command<S: KeyValueStore + ?Sized>(
    catalog: &Catalog<'_, S>,
    command: ProjectCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        ProjectCommand::Add { name } => catalog.add_project(&name).await?,
        ProjectCommand::Remove { name } => catalog.remove_project(&name).await?,
        ProjectCommand::Rename { from, to } => catalog.rename_project(&from, &to).await?,
        ProjectCommand::Reset { name } => {
            let sites = catalog.reset_project(&name).await?;
            writeln!(out, "Reset {} sites of {name}", sites.len())?;
        }
        ProjectCommand::Collapse { name } => catalog.set_project_open(&name, false).await?,
        ProjectCommand::Expand { name } => catalog.set_project_open(&name, true).await?,
    }
    Ok(())
}

pub async fn process_todo_command<S: KeyValueStore + ?Sized>(
    catalog: &Catalog<'_, S>,
    command: TodoCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        TodoCommand::Add { project, text } => catalog.add_todo(&project, &text.join(" ")).await?,
        TodoCommand::Toggle { project, number } => {
            let done = catalog.toggle_todo(&project, todo_index(number)?).await?;
            let mark = if done { "done" } else { "not done" };
            writeln!(out, "To-do {number} of {project} is {mark}")?;
        }
        TodoCommand::Remove { project, number } => {
            let removed = catalog.remove_todo(&project, todo_index(number)?).await?;
            writeln!(out, "Removed \"{}\"", removed.text)?;
        }
    }
    Ok(())
}

fn todo_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("To-dos are numbered from 1"))
}
