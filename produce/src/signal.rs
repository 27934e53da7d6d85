// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Signal handling

use std::io;
use std::sync::Arc;

use log::warn;
use tokio::signal::unix::{signal, SignalKind};

use crate::sched::Context;

/// Route SIGTERM/SIGINT into the build's abort path. Parked `~` files are
/// left on disk for inspection.
pub fn watch(context: Arc<Context>) -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        warn!(target: "produce", "signal received, aborting");
        context.interrupt();
    });

    Ok(())
}
