// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `foreman`: operator commands against the controller database.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "foreman", about = "Operate a foreman backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or stop accepting new jobs on a backend
    Pause {
        action: OnOff,
        backend: String,
    },
    /// Manually enable or disable database maintenance mode
    DbMaintenance {
        action: OnOff,
        backend: String,
    },
    /// Reset running jobs so they restart cleanly after a reboot
    PrepareForReboot {
        backend: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Force-fail jobs matching the given (partial) IDs
    KillJob {
        partial_ids: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Retry a job that failed with an internal error
    RetryJob {
        partial_id: String,
    },
    /// Synthesise a JobRequest and expand it (dev utility)
    AddJob {
        repo_url: String,
        actions: Vec<String>,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long)]
        commit: Option<String>,
        #[arg(long, default_value = "test")]
        workspace: String,
        #[arg(long, default_value = "dummy")]
        database: String,
        #[arg(long)]
        force_run_dependencies: bool,
        #[arg(long)]
        force_run_failed: bool,
    },
    /// Read or write raw scheduling flags
    Flags {
        #[command(subcommand)]
        command: commands::flags::FlagsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pause { action, backend } => commands::pause::run(action, &backend),
        Commands::DbMaintenance { action, backend } => {
            commands::db_maintenance::run(action, &backend)
        }
        Commands::PrepareForReboot { backend, yes } => {
            commands::prepare_for_reboot::run(&backend, yes)
        }
        Commands::KillJob { partial_ids, yes } => commands::kill_job::run(&partial_ids, yes),
        Commands::RetryJob { partial_id } => commands::retry_job::run(&partial_id),
        Commands::AddJob {
            repo_url,
            actions,
            branch,
            commit,
            workspace,
            database,
            force_run_dependencies,
            force_run_failed,
        } => {
            commands::add_job::run(commands::add_job::Args {
                repo_url,
                actions,
                branch,
                commit,
                workspace,
                database,
                force_run_dependencies,
                force_run_failed,
            })
            .await
        }
        Commands::Flags { command } => commands::flags::run(command),
    }
}
