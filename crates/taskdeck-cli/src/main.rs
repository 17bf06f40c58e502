//! Taskdeck CLI - Command-line interface for the local task list
//!
//! Captures tasks into the local database and keeps them in sync with a
//! single remote backup file.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::{run_add, NewTask};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::done::run_done;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_delete_remote, run_sync_resolve, run_sync_status,
    run_sync_watch,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskdeck_core=warn,taskdeck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Config { command }) => run_config(command, profile)?,
        Some(command) => {
            let db_path = resolve_db_path(cli.db_path)?;
            match command {
                Commands::Add {
                    title,
                    notes,
                    priority,
                    due,
                    tags,
                } => {
                    let new_task = NewTask {
                        title_parts: title,
                        notes,
                        priority: priority.into(),
                        due_date: due,
                        tags,
                    };
                    run_add(new_task, &db_path, profile).await?;
                }
                Commands::List { all, json } => run_list(all, json, &db_path, profile).await?,
                Commands::Done { id } => run_done(&id, &db_path, profile).await?,
                Commands::Delete { id } => run_delete(&id, &db_path, profile).await?,
                Commands::Sync { command } => match command.unwrap_or(SyncCommands::Now) {
                    SyncCommands::Now => run_sync(&db_path, profile).await?,
                    SyncCommands::Status { json } => {
                        run_sync_status(json, &db_path, profile).await?;
                    }
                    SyncCommands::Conflicts { json } => {
                        run_sync_conflicts(json, &db_path, profile).await?;
                    }
                    SyncCommands::Resolve { id, keep } => {
                        run_sync_resolve(&id, keep.into(), &db_path, profile).await?;
                    }
                    SyncCommands::Watch => run_sync_watch(&db_path, profile).await?,
                    SyncCommands::DeleteRemote { yes } => {
                        run_sync_delete_remote(yes, &db_path, profile).await?;
                    }
                },
                Commands::Export { output } => {
                    run_export(output.as_deref(), &db_path, profile).await?;
                }
                Commands::Import { path } => run_import(&path, &db_path, profile).await?,
                Commands::Auth { command } => run_auth(command, &db_path, profile).await?,
                Commands::Completions { .. } | Commands::Config { .. } => {}
            }
        }
        None => {
            // Quick capture mode: taskdeck "buy milk"
            if cli.title.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                let db_path = resolve_db_path(cli.db_path)?;
                let new_task = NewTask {
                    title_parts: cli.title,
                    notes: None,
                    priority: taskdeck_core::models::TaskPriority::default(),
                    due_date: None,
                    tags: Vec::new(),
                };
                run_add(new_task, &db_path, profile).await?;
            }
        }
    }

    Ok(())
}
