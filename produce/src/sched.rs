// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The scheduler: one cooperative task per node, lazily spawned. A node
//! waits for its prerequisites' completion signals, consults freshness,
//! reserves job slots and runs its recipe. The first failure cancels
//! everything else.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use log::{debug, error, info, trace};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::eval::{self, Evaluator};
use crate::fresh::{self, Decision};
use crate::graph::{Graph, NodeIndex, Outcome, State};
use crate::options::Options;
use crate::plan::{self, Planner};
use crate::rule::RuleSet;
use crate::{depfile, recipe, util};

/// Shared build state for one invocation, threaded explicitly instead of
/// living in globals.
pub struct Context {
    rules: RuleSet,
    options: Options,
    evaluator: Box<dyn Evaluator>,
    graph: Mutex<Graph>,
    tasks: Mutex<HashMap<NodeIndex, watch::Receiver<State>>>,
    slots: Semaphore,
    abort: CancellationToken,
    failure: Mutex<Option<Error>>,
}

impl Context {
    pub fn new(rules: RuleSet, options: Options, evaluator: Box<dyn Evaluator>) -> Arc<Self> {
        let slots = Semaphore::new(options.jobs.max(1));
        Arc::new(Self {
            rules,
            options,
            evaluator,
            graph: Mutex::new(Graph::new()),
            tasks: Mutex::new(HashMap::new()),
            slots,
            abort: CancellationToken::new(),
            failure: Mutex::new(None),
        })
    }

    /// Abort the build from outside, e.g. on SIGTERM/SIGINT. Running
    /// recipes are terminated; parked outputs stay on disk.
    pub fn interrupt(&self) {
        {
            let mut failure = self.failure.lock().expect("failure lock");
            if failure.is_none() {
                *failure = Some(Error::Aborted("interrupted".to_owned()));
            }
        }
        self.abort.cancel();
    }
}

/// Bring `targets` up to date. Returns the single root-cause error when
/// anything failed; sibling aborts are only logged.
pub async fn build(context: Arc<Context>, targets: &[String]) -> Result<(), Error> {
    debug!(target: "produce", "goal: {}", targets.iter().join(", "));

    let roots = {
        let mut graph = context.graph.lock().expect("graph lock");
        let mut planner = Planner::new(&mut graph, &context.rules, &*context.evaluator, &context.options);
        let roots = targets
            .iter()
            .map(|target| planner.plan(target))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(target: "produce", "planned {} nodes", graph.node_count());
        roots
    };

    // spawn every requested target up front so top-level goals run
    // concurrently
    let mut failed = false;
    let receivers: Vec<_> = roots.iter().map(|&root| ensure_task(&context, root)).collect();
    for rx in receivers {
        if wait_terminal(rx).await == State::Failed {
            failed = true;
        }
    }

    // join the rest of the graph; tasks may still be spawning tasks
    let mut joined = 0;
    loop {
        let receivers: Vec<_> = {
            let tasks = context.tasks.lock().expect("tasks lock");
            tasks.values().cloned().collect()
        };
        if receivers.len() == joined {
            break;
        }
        joined = receivers.len();
        for rx in receivers {
            if wait_terminal(rx).await == State::Failed {
                failed = true;
            }
        }
    }

    if failed {
        let failure = context.failure.lock().expect("failure lock").take();
        Err(failure.unwrap_or_else(|| Error::Aborted("build aborted".to_owned())))
    } else {
        Ok(())
    }
}

fn ensure_task(context: &Arc<Context>, index: NodeIndex) -> watch::Receiver<State> {
    let mut tasks = context.tasks.lock().expect("tasks lock");
    if let Some(rx) = tasks.get(&index) {
        return rx.clone();
    }

    let state = context.graph.lock().expect("graph lock").node(index).state;
    let (tx, rx) = watch::channel(state);
    tasks.insert(index, rx.clone());

    let context = Arc::clone(context);
    tokio::spawn(async move { run_node(context, index, tx).await });

    rx
}

async fn wait_terminal(mut rx: watch::Receiver<State>) -> State {
    match rx.wait_for(|state| state.is_terminal()).await {
        Ok(state) => *state,
        // the owning task is gone; treat as failed
        Err(_) => State::Failed,
    }
}

fn transition(context: &Context, tx: &watch::Sender<State>, index: NodeIndex, state: State) {
    context.graph.lock().expect("graph lock").node_mut(index).state = state;
    let _ = tx.send(state);
}

/// Record the build's root cause, once; everything after it is noise.
fn fail(context: &Context, error: Error) {
    {
        let mut failure = context.failure.lock().expect("failure lock");
        if failure.is_none() {
            error!(target: "produce", "{error}");
            *failure = Some(error);
        } else {
            debug!(target: "produce", "suppressed secondary failure: {error}");
        }
    }
    context.abort.cancel();
}

async fn run_node(context: Arc<Context>, index: NodeIndex, tx: watch::Sender<State>) {
    let (name, deps, type_deps, leader) = {
        let graph = context.graph.lock().expect("graph lock");
        let node = graph.node(index);
        (
            node.name.clone(),
            node.prereqs.clone(),
            node.type_prereqs.clone(),
            graph.leader(index),
        )
    };

    // every prerequisite, ordering-only ones included, must be done first
    let mut waits: Vec<NodeIndex> = deps.iter().chain(&type_deps).copied().collect();
    waits.sort_unstable();
    waits.dedup();
    for prereq in waits {
        let rx = ensure_task(&context, prereq);
        if wait_terminal(rx).await == State::Failed {
            debug!(target: "produce", "{name}: abandoned, a prerequisite failed");
            transition(&context, &tx, index, State::Failed);
            return;
        }
    }

    // type-prereqs are depfiles: parse them and pull in what they declare
    for type_dep in type_deps {
        let added = match attach_depfile(&context, index, type_dep).await {
            Ok(added) => added,
            Err(error) => {
                fail(&context, error);
                transition(&context, &tx, index, State::Failed);
                return;
            }
        };
        for prereq in added {
            let rx = ensure_task(&context, prereq);
            if wait_terminal(rx).await == State::Failed {
                transition(&context, &tx, index, State::Failed);
                return;
            }
        }
    }

    // group members defer to the leader's single execution
    if leader != index {
        trace!(target: "produce", "{name}: waiting on group leader");
        let rx = ensure_task(&context, leader);
        let state = match wait_terminal(rx).await {
            State::Done(outcome) => State::Done(outcome),
            _ => State::Failed,
        };
        transition(&context, &tx, index, state);
        return;
    }

    if context.abort.is_cancelled() {
        transition(&context, &tx, index, State::Failed);
        return;
    }

    let decision = {
        let mut graph = context.graph.lock().expect("graph lock");
        fresh::evaluate(&mut graph, &context.rules, &context.options, index)
    };
    trace!(target: "produce", "{name}: freshness says {decision}");

    match decision {
        Decision::Skip => transition(&context, &tx, index, State::Done(Outcome::Skipped)),
        Decision::Pretend => {
            debug!(target: "produce", "{name}: pretending up to date");
            transition(&context, &tx, index, State::Done(Outcome::Pretended));
        }
        Decision::Run => match execute(&context, index, &name, &tx).await {
            Ok(outcome) => transition(&context, &tx, index, State::Done(outcome)),
            Err(error) => {
                if error.is_abort() {
                    debug!(target: "produce", "{name}: aborted");
                } else {
                    fail(&context, error);
                }
                transition(&context, &tx, index, State::Failed);
            }
        },
    }
}

/// Run the node's recipe under the job budget. Only ever called on group
/// leaders.
async fn execute(
    context: &Arc<Context>,
    index: NodeIndex,
    name: &str,
    tx: &watch::Sender<State>,
) -> Result<Outcome, Error> {
    let (rule_index, binding, members) = {
        let graph = context.graph.lock().expect("graph lock");
        let node = graph.node(index);
        (
            node.rule.expect("only rule-bearing nodes run"),
            node.binding.clone(),
            graph.group_members(index),
        )
    };
    let rule = context.rules.get(rule_index);

    // a pure aggregator runs nothing; it counts as built when any of its
    // inputs were, so staleness keeps propagating upwards
    let Some(template) = &rule.recipe else {
        let graph = context.graph.lock().expect("graph lock");
        let rebuilt = graph
            .node(index)
            .prereqs
            .iter()
            .any(|&p| graph.node(p).state == State::Done(Outcome::Built));
        return Ok(if rebuilt { Outcome::Built } else { Outcome::Skipped });
    };

    if context.options.dry_run {
        info!(target: "produce", "{name}: would run recipe");
        return Ok(Outcome::Built);
    }

    let code = eval::expand(template, &binding, &*context.evaluator).map_err(|source| {
        Error::Plan(plan::Error::Expand {
            line: rule.line,
            source,
        })
    })?;

    // a budget smaller than the declared parallelism still runs the
    // recipe, just without headroom
    let permits = (rule.parallelism as usize).min(context.options.jobs.max(1)) as u32;
    transition(context, tx, index, State::Ready);

    let _permit = if permits > 0 {
        trace!(target: "produce", "{name}: acquiring {permits} job slots");
        tokio::select! {
            permit = context.slots.acquire_many(permits) => Some(permit.expect("job semaphore never closes")),
            () = context.abort.cancelled() => {
                return Err(Error::Recipe(recipe::Error::Aborted { target: name.to_owned() }));
            }
        }
    } else {
        None
    };

    if context.abort.is_cancelled() {
        return Err(Error::Recipe(recipe::Error::Aborted { target: name.to_owned() }));
    }

    // task targets are virtual; everything else parks and re-stats the
    // whole output group
    let outputs: Vec<PathBuf> = if rule.task {
        vec![]
    } else {
        let graph = context.graph.lock().expect("graph lock");
        members
            .iter()
            .map(|&m| context.options.dir.join(&graph.node(m).name))
            .collect()
    };

    transition(context, tx, index, State::Running);
    info!(target: "produce", "{name}: running recipe");

    recipe::run(name, &rule.shell, &code, &context.options.dir, &outputs, &context.abort).await?;

    {
        let mut graph = context.graph.lock().expect("graph lock");
        for &member in &members {
            graph.refresh_mtime(member, &context.options.dir);
        }
    }

    touch_stale_below_pretended(context, index);

    info!(target: "produce", "{name}: recipe finished");
    Ok(Outcome::Built)
}

/// The pretend-up-to-date bookkeeping: once an ancestor of a pretended
/// node has been rebuilt, inputs below the pretended node that are newer
/// than it are touched. A later honest run still sees the pretended
/// intermediate as stale, even if it gets deleted in between.
fn touch_stale_below_pretended(context: &Context, index: NodeIndex) {
    let mut graph = context.graph.lock().expect("graph lock");
    let dir = context.options.dir.clone();

    let prereqs = graph.node(index).prereqs.clone();
    for pretended in prereqs {
        if graph.node(pretended).state != State::Done(Outcome::Pretended) {
            continue;
        }
        let Some(base) = graph.mtime(pretended, &dir).time() else {
            continue;
        };

        for below in graph.reachable(pretended) {
            if below == pretended {
                continue;
            }
            let Some(time) = graph.mtime(below, &dir).time() else {
                continue;
            };
            if time > base {
                let name = graph.node(below).name.clone();
                debug!(target: "produce", "touching {name}, newer than pretended {}", graph.node(pretended).name);
                if let Err(error) = util::touch(&dir.join(&name)) {
                    debug!(target: "produce", "cannot touch {name}: {error}");
                }
                graph.refresh_mtime(below, &dir);
            }
        }
    }
}

/// Parse the depfile behind a type-prereq and wire the declared deps as
/// ordinary prerequisites of `index`. Missing depfiles are fine: the
/// first build has not generated them yet.
async fn attach_depfile(context: &Arc<Context>, index: NodeIndex, type_dep: NodeIndex) -> Result<Vec<NodeIndex>, Error> {
    let (consumer, path) = {
        let graph = context.graph.lock().expect("graph lock");
        (
            graph.node(index).name.clone(),
            context.options.dir.join(&graph.node(type_dep).name),
        )
    };

    if !path.exists() {
        return Ok(vec![]);
    }

    let text = fs_err::tokio::read_to_string(&path).await.map_err(Error::Depfile)?;
    let deps = depfile::deps_for(&depfile::parse(&text), &consumer);

    let mut graph = context.graph.lock().expect("graph lock");
    let planned = {
        let mut planner = Planner::new(&mut graph, &context.rules, &*context.evaluator, &context.options);
        deps.iter()
            .map(|dep| planner.plan(dep))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut added = vec![];
    for prereq in planned {
        match graph.add_prereq(index, prereq) {
            Ok(true) => added.push(prereq),
            Ok(false) => {}
            Err(path) => return Err(Error::Plan(plan::Error::Cycle { path })),
        }
    }

    if !added.is_empty() {
        debug!(target: "produce", "{consumer}: depfile declares {} extra prerequisites", added.len());
    }

    Ok(added)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Plan(#[from] plan::Error),

    #[error(transparent)]
    Recipe(#[from] recipe::Error),

    #[error("cannot read depfile: {0}")]
    Depfile(#[source] io::Error),

    #[error("aborted: {0}")]
    Aborted(String),
}

impl Error {
    fn is_abort(&self) -> bool {
        match self {
            Error::Aborted(_) => true,
            Error::Recipe(error) => error.is_abort(),
            _ => false,
        }
    }
}
