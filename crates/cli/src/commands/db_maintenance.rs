// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Result;
use fm_core::{FLAG_MANUAL_DB_MAINTENANCE, FLAG_MODE};

use super::{now, open_database};
use crate::OnOff;

pub fn run(action: OnOff, backend: &str) -> Result<()> {
    let (_, db) = open_database()?;
    let flags: [(&str, Option<&str>); 2] = match action {
        OnOff::On => [(FLAG_MODE, Some("db-maintenance")), (FLAG_MANUAL_DB_MAINTENANCE, Some("on"))],
        OnOff::Off => [(FLAG_MODE, None), (FLAG_MANUAL_DB_MAINTENANCE, None)],
    };
    for (id, value) in flags {
        let flag = db.set_flag(id, value, backend, now())?;
        println!("{}", flag);
    }
    Ok(())
}
