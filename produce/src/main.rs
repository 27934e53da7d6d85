// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

/// Main entry point
#[tokio::main]
async fn main() {
    if let Err(error) = produce::cli::process().await {
        eprintln!("produce: {error}");
        std::process::exit(1);
    }
}
