use std::{io, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

mod aggregate;
mod aggregate_command;
mod config;
mod console;
mod datetime;
mod entity;
mod logger;
mod reference;
mod show_command;
mod store;
mod time_entry;
mod toggl;

use aggregate_command::{AggregateArgs, AggregateCommand};
use config::Config;
use console::{ConsoleMarkdownList, ConsolePresenter};
use entity::EntityCatalog;
use show_command::{ShowArgs, ShowCommand};
use store::JsonStore;
use toggl::TogglExport;

/// time entryを参照ごとに集計するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- aggregate --input entries.json --start 2024-01-01 --end 2024-01-31
/// $ cargo run -- show --run-id 20240131_180000
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(long = "config", global = true, help = "Path to a configuration file (JSON)")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    Aggregate(AggregateArgs),
    Show(ShowArgs),
}

fn main() -> Result<()> {
    let args = Args::parse();

    logger::setup_logger(args.verbose)?;
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let mut store = JsonStore::new(&config.data_dir);
    let mut stdout = io::stdout();

    match args.subcommand {
        SubCommands::Aggregate(mut aggregate) => {
            if aggregate.users.is_empty() {
                aggregate.users = config.users.clone();
            }
            let sources: Vec<TogglExport> = aggregate
                .inputs
                .iter()
                .map(|input| TogglExport::new(input.clone(), aggregate.users.clone()))
                .collect();
            let catalog = aggregate
                .entities
                .as_deref()
                .map(EntityCatalog::load)
                .transpose()
                .context("Failed to load entity cache")?;

            let mut command = AggregateCommand::new(&sources, &mut store);
            let aggregation = command.run(&aggregate)?;
            ConsoleMarkdownList::new(&mut stdout, catalog.as_ref())
                .show_groups(&aggregation.groups, &aggregation.rejections)?;
            if !aggregation.rejections.is_empty() {
                warn!("{} time entries were rejected", aggregation.rejections.len());
            }
            aggregate.check_rejections(&aggregation)?;
            if let Some(run_id) = command.save(&aggregate, &aggregation)? {
                info!("Saved groups as run {}", run_id);
            }
        }
        SubCommands::Show(show) => {
            let (info, groups) = ShowCommand::new(&store).run(&show)?;
            let mut presenter = ConsoleMarkdownList::new(&mut stdout, None);
            if let Some(info) = info {
                presenter.show_run(&show.run_id, &info)?;
            }
            presenter.show_groups(&groups, &[])?;
        }
    }

    Ok(())
}
