// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Shared sandbox for scenario tests: a temporary working directory with a
//! `produce.ini`, driven through the engine API. Recipes append to
//! `runs.log` when a test needs to count executions.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use produce::{buildfile, sched, Context, Evaluator, Options, VarLookup};

pub struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new(ini: &str) -> Self {
        let dir = tempfile::tempdir().expect("create sandbox");
        fs::write(dir.path().join("produce.ini"), ini).expect("write produce.ini");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, contents).expect("write file");
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("read file")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path().join(name).exists()
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.path().join(name)).expect("remove file");
    }

    /// Top-level directory entries, sorted
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path())
            .expect("read sandbox dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn assert_dir(&self, expected: &[&str]) {
        let mut expected: Vec<String> = expected.iter().map(|s| (*s).to_owned()).collect();
        expected.sort();
        assert_eq!(self.entries(), expected);
    }

    pub fn mtime(&self, name: &str) -> SystemTime {
        self.qmtime(name).unwrap_or_else(|| panic!("{name} does not exist"))
    }

    pub fn qmtime(&self, name: &str) -> Option<SystemTime> {
        fs::metadata(self.path().join(name))
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Create or update `name` with a fresh mtime
    pub fn touch(&self, name: &str) {
        let path = self.path().join(name);
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
            .expect("touch file");
    }

    /// Wait long enough for mtimes to be distinguishable
    pub fn sleep(&self) {
        std::thread::sleep(Duration::from_millis(30));
    }

    /// Lines recipes appended to `runs.log`; empty when nothing ran
    pub fn runs(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("runs.log"))
            .map(|text| text.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub async fn produce(&self, targets: &[&str]) -> Result<(), sched::Error> {
        self.produce_with(targets, |_| {}).await
    }

    pub async fn produce_with(
        &self,
        targets: &[&str],
        configure: impl FnOnce(&mut Options),
    ) -> Result<(), sched::Error> {
        self.produce_eval(targets, configure, Box::new(VarLookup)).await
    }

    pub async fn produce_eval(
        &self,
        targets: &[&str],
        configure: impl FnOnce(&mut Options),
        evaluator: Box<dyn Evaluator>,
    ) -> Result<(), sched::Error> {
        let (context, targets) = self.context(targets, configure, evaluator);
        sched::build(context, &targets).await
    }

    /// Build a scheduler context without running it, for tests that need
    /// to interrupt a build in flight.
    pub fn context(
        &self,
        targets: &[&str],
        configure: impl FnOnce(&mut Options),
        evaluator: Box<dyn Evaluator>,
    ) -> (std::sync::Arc<Context>, Vec<String>) {
        let rules = buildfile::load(&self.path().join("produce.ini")).expect("valid build file");

        let targets: Vec<String> = if targets.is_empty() {
            // the CLI default: the first rule names the goal
            let first = rules.first().expect("at least one rule");
            vec![first.target.source().to_owned()]
        } else {
            targets.iter().map(|s| (*s).to_owned()).collect()
        };

        let mut options = Options::new(self.path());
        configure(&mut options);

        (Context::new(rules, options, evaluator), targets)
    }
}
