// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use pattern::Pattern;
use thiserror::Error;

use crate::eval::VarLookup;
use crate::options::Options;
use crate::{buildfile, sched, signal, Context};

#[derive(Debug, Parser)]
#[command(name = "produce", version, about = "Dependency-driven builds for data processing pipelines")]
pub struct Command {
    #[arg(short = 'f', long = "file", value_name = "PATH", default_value = "produce.ini", help = "Build file")]
    pub file: PathBuf,

    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 1, help = "Number of simultaneous job slots")]
    pub jobs: usize,

    #[arg(short = 'n', long = "dry-run", help = "Plan and log, but do not run recipes")]
    pub dry_run: bool,

    #[arg(short = 'B', long = "always-build", help = "Rebuild every target considered")]
    pub force: bool,

    #[arg(
        short = 'b',
        long = "build",
        value_name = "TARGET",
        action = ArgAction::Append,
        help = "Run recipes only for the listed targets"
    )]
    pub build_only: Vec<String>,

    #[arg(
        short = 'u',
        long = "pretend-up-to-date",
        value_name = "PATTERN",
        action = ArgAction::Append,
        help = "Treat nodes matching PATTERN as fresh"
    )]
    pub pretend: Vec<String>,

    #[arg(short = 'd', long = "debug", action = ArgAction::Count, help = "Internal trace (-d debug, -dd trace)")]
    pub debug: u8,

    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

/// Process all CLI arguments
pub async fn process() -> Result<(), Error> {
    let command = Command::parse();

    let level = match command.debug {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .try_init();

    let rules = buildfile::load(&command.file)?;

    let targets = if command.targets.is_empty() {
        let first = rules.first().ok_or(Error::NoRules)?;
        if !first.target.is_literal() {
            return Err(Error::DefaultTarget(first.target.source().to_owned()));
        }
        vec![first.target.source().to_owned()]
    } else {
        command.targets.clone()
    };

    let pretend = command
        .pretend
        .iter()
        .map(|p| p.parse::<Pattern>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::Pretend)?;

    let options = Options {
        file: command.file,
        dir: ".".into(),
        jobs: command.jobs.max(1),
        dry_run: command.dry_run,
        force: command.force,
        build_only: command.build_only,
        pretend,
    };

    let context = Context::new(rules, options, Box::new(VarLookup));
    signal::watch(Arc::clone(&context)).map_err(Error::Signal)?;

    sched::build(context, &targets).await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    BuildFile(#[from] buildfile::Error),

    #[error("build file has no rules, nothing to produce")]
    NoRules,

    #[error("default target `{0}` contains pattern holes, name a target explicitly")]
    DefaultTarget(String),

    #[error("invalid -u pattern: {0}")]
    Pretend(#[source] pattern::Error),

    #[error("cannot install signal handlers: {0}")]
    Signal(#[source] io::Error),

    #[error(transparent)]
    Build(#[from] sched::Error),
}
