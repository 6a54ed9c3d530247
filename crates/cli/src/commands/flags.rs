// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Result;
use clap::Subcommand;

use super::{now, open_database};

#[derive(Subcommand)]
pub enum FlagsCommand {
    /// Show flags for a backend (all of them, or just the ones named)
    Get {
        backend: String,
        ids: Vec<String>,
    },
    /// Set `id=value` pairs (`id=` clears a flag)
    Set {
        backend: String,
        pairs: Vec<String>,
    },
}

pub fn run(command: FlagsCommand) -> Result<()> {
    let (_, db) = open_database()?;
    match command {
        FlagsCommand::Get { backend, ids } => {
            let flags = db.flags_for_backend(&backend)?;
            for flag in flags {
                if ids.is_empty() || ids.contains(&flag.id) {
                    println!("{}", flag);
                }
            }
        }
        FlagsCommand::Set { backend, pairs } => {
            for pair in pairs {
                let (id, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("'{}' is not of the form id=value", pair))?;
                let value = Some(value).filter(|v| !v.is_empty());
                let flag = db.set_flag(id, value, &backend, now())?;
                println!("{}", flag);
            }
        }
    }
    Ok(())
}
