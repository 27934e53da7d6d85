// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Recipe execution with atomic outputs: existing outputs are parked as
//! `name~` before the run, partial outputs are parked again on failure,
//! and leftover parked copies are cleared on success.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use log::{debug, trace};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::util::parked;

/// How long a terminated recipe gets to exit before SIGKILL
const GRACE: Duration = Duration::from_secs(2);

/// Run one recipe for an output group. `outputs` is empty for task
/// targets, which produce no files.
pub async fn run(
    target: &str,
    shell: &[String],
    code: &str,
    dir: &Path,
    outputs: &[PathBuf],
    abort: &CancellationToken,
) -> Result<(), Error> {
    park(outputs)?;

    let (program, args) = shell.split_first().expect("shell is never empty");
    trace!(target: "produce", "{target}: spawning {program} for recipe");

    let mut child = Command::new(program)
        .args(args)
        .arg(code)
        .current_dir(dir)
        .process_group(0)
        .spawn()
        .map_err(|source| Error::Spawn {
            target: target.to_owned(),
            source,
        })?;

    let status = tokio::select! {
        status = child.wait() => status.map_err(|source| Error::Spawn {
            target: target.to_owned(),
            source,
        })?,
        () = abort.cancelled() => {
            terminate(target, &mut child).await;
            park(outputs)?;
            return Err(Error::Aborted {
                target: target.to_owned(),
            });
        }
    };

    if !status.success() {
        park(outputs)?;
        return Err(match status.code() {
            Some(code) => Error::Failed {
                target: target.to_owned(),
                code,
            },
            None => Error::Signaled {
                target: target.to_owned(),
                signal: status
                    .signal()
                    .and_then(|s| Signal::try_from(s).ok())
                    .map(|s| s.as_str().to_owned())
                    .unwrap_or_else(|| "unknown".to_owned()),
            },
        });
    }

    // exit 0 must leave every declared output behind
    if let Some(missing) = outputs.iter().find(|output| !output.exists()) {
        park(outputs)?;
        return Err(Error::FailedToProduce {
            target: target.to_owned(),
            output: missing.strip_prefix(dir).unwrap_or(missing).display().to_string(),
        });
    }

    unpark(outputs)?;
    Ok(())
}

/// Rename every existing output to its `name~` sibling
fn park(outputs: &[PathBuf]) -> io::Result<()> {
    for output in outputs {
        if output.exists() {
            fs::rename(output, parked(output))?;
        }
    }
    Ok(())
}

/// Remove parked copies left over from earlier runs
fn unpark(outputs: &[PathBuf]) -> io::Result<()> {
    for output in outputs {
        let parked = parked(output);
        if parked.exists() {
            fs::remove_file(parked)?;
        }
    }
    Ok(())
}

/// SIGTERM the recipe's process group, escalating to SIGKILL after the
/// grace period.
async fn terminate(target: &str, child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let group = Pid::from_raw(-(pid as i32));

    debug!(target: "produce", "{target}: terminating recipe (pid {pid})");
    let _ = kill(group, Signal::SIGTERM);

    if timeout(GRACE, child.wait()).await.is_err() {
        debug!(target: "produce", "{target}: recipe ignored SIGTERM, killing");
        let _ = kill(group, Signal::SIGKILL);
        let _ = child.wait().await;
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{target}: cannot spawn recipe: {source}")]
    Spawn {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("{target}: recipe failed with exit code {code}")]
    Failed { target: String, code: i32 },

    #[error("{target}: recipe stopped by signal {signal}")]
    Signaled { target: String, signal: String },

    #[error("{target}: recipe did not produce {output}")]
    FailedToProduce { target: String, output: String },

    #[error("{target}: recipe aborted")]
    Aborted { target: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for recipes we stopped ourselves rather than genuine failures
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }
}
