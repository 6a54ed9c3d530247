// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `foremand`: the backend job controller.

#[tokio::main]
async fn main() {
    if let Err(e) = fm_daemon::run().await {
        eprintln!("foremand: {}", e);
        std::process::exit(1);
    }
}
