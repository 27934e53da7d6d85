// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use pattern::Pattern;

/// Per-invocation build context, threaded explicitly through planning and
/// scheduling.
#[derive(Debug)]
pub struct Options {
    /// Build file path
    pub file: PathBuf,
    /// Directory targets are resolved against
    pub dir: PathBuf,
    /// Number of simultaneous job slots
    pub jobs: usize,
    /// Plan and log, but run nothing
    pub dry_run: bool,
    /// Rebuild every candidate (`-B`)
    pub force: bool,
    /// If non-empty, recipes run only for these targets (`-b`)
    pub build_only: Vec<String>,
    /// Nodes matching any of these patterns are pretended fresh (`-u`)
    pub pretend: Vec<Pattern>,
}

impl Options {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            file: "produce.ini".into(),
            dir: dir.into(),
            jobs: 1,
            dry_run: false,
            force: false,
            build_only: vec![],
            pretend: vec![],
        }
    }
}
