// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Result;
use fm_core::FLAG_PAUSED;

use super::{now, open_database};
use crate::OnOff;

pub fn run(action: OnOff, backend: &str) -> Result<()> {
    let (_, db) = open_database()?;
    let value = match action {
        OnOff::On => Some("true"),
        OnOff::Off => None,
    };
    let flag = db.set_flag(FLAG_PAUSED, value, backend, now())?;
    println!("{}", flag);
    Ok(())
}
