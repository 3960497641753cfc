pub mod backup;
pub mod manage;
pub mod report;

use std::{io::Write, path::PathBuf};

use anyhow::{bail, Result};
use backup::{export_to, import_from};
use clap::{Parser, Subcommand};
use manage::{
    process_project_command, process_site_command, process_todo_command, ProjectCommand,
    SiteCommand, TodoCommand,
};
use report::print_report;
use tracing::level_filters::LevelFilter;

use crate::{
    store::{catalog::Catalog, entities::Theme, json_store::JsonFileStore, KeyValueStore},
    tracker::{args::TrackingArgs, start_tracker},
    utils::{
        dir::{create_application_default_path, create_application_path},
        logging::{enable_logging, CLI_PREFIX},
        percentage::Percentage,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Sitetally", version, long_about = None)]
#[command(about = "Tracks time spent on chosen websites and groups it into projects", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default uses $XDG_STATE_HOME/sitetally or $HOME/.local/state/sitetally"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the browser host in the current console, reading messages from stdin. Used for debugging"
    )]
    Serve {
        #[command(flatten)]
        tracking: TrackingArgs,
    },
    #[command(about = "Show tracked time grouped by project")]
    Report {
        #[arg(
            short = 'p',
            long = "percentage",
            default_value = "0",
            help = "Hide sites below this share of the total time"
        )]
        min_percentage: Percentage,
    },
    #[command(about = "Manage tracked sites")]
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
    #[command(about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    #[command(about = "Set the note of a project. An empty note removes it")]
    Note {
        project: String,
        #[arg(num_args = 0..)]
        text: Vec<String>,
    },
    #[command(about = "Manage the to-do list of a project")]
    Todo {
        #[command(subcommand)]
        command: TodoCommand,
    },
    #[command(about = "Reset the time of every tracked site")]
    ResetAll {
        #[arg(long, help = "Confirm the reset")]
        yes: bool,
    },
    #[command(about = "Write a backup of the whole store")]
    Export {
        #[arg(help = "Target file. Defaults to sitetally-backup-YYYY-MM-DD.json")]
        output: Option<PathBuf>,
    },
    #[command(about = "Replace the whole store with a backup")]
    Import {
        input: PathBuf,
        #[arg(long, help = "Confirm replacing all current data")]
        yes: bool,
    },
    #[command(about = "Show or set the timesheet URL")]
    Timesheet { url: Option<String> },
    #[command(about = "Show or set the theme")]
    Theme { value: Option<Theme> },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => create_application_path(dir)?,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;

    if let Commands::Serve { tracking } = &args.commands {
        return start_tracker(app_dir, tracking.into()).await;
    }

    let store = JsonFileStore::in_dir(&app_dir)?;
    let mut stdout = std::io::stdout().lock();
    process_command(&store, args.commands, &mut stdout).await
}

async fn process_command(
    store: &impl KeyValueStore,
    command: Commands,
    out: &mut impl Write,
) -> Result<()> {
    let catalog = Catalog::new(store);
    match command {
        Commands::Serve { .. } => bail!("The host can't be started from here"),
        Commands::Report { min_percentage } => {
            print_report(&catalog.report().await?, min_percentage, out)?;
        }
        Commands::Site { command } => process_site_command(&catalog, command, out).await?,
        Commands::Project { command } => process_project_command(&catalog, command, out).await?,
        Commands::Note { project, text } => {
            catalog.set_note(&project, &text.join(" ")).await?;
        }
        Commands::Todo { command } => process_todo_command(&catalog, command, out).await?,
        Commands::ResetAll { yes } => {
            if !yes {
                bail!("This zeroes every tracked site. Pass --yes to confirm");
            }
            let count = catalog.reset_all().await?;
            writeln!(out, "Reset {count} sites")?;
        }
        Commands::Export { output } => {
            let path = export_to(&catalog, output, chrono::Local::now().date_naive()).await?;
            writeln!(out, "Exported to {}", path.display())?;
        }
        Commands::Import { input, yes } => {
            if !yes {
                bail!("Import replaces all current data. Pass --yes to confirm");
            }
            let count = import_from(&catalog, &input).await?;
            writeln!(out, "Imported {count} entries")?;
        }
        Commands::Timesheet { url: Some(url) } => catalog.set_timesheet_url(&url).await?,
        Commands::Timesheet { url: None } => match catalog.timesheet_url().await? {
            Some(url) => writeln!(out, "{url}")?,
            None => writeln!(out, "No timesheet URL set")?,
        },
        Commands::Theme { value: Some(theme) } => catalog.set_theme(theme).await?,
        Commands::Theme { value: None } => writeln!(out, "{}", catalog.theme().await?)?,
    }
    Ok(())
}
