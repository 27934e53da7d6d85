// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Freshness evaluation: decides, per node, whether its recipe must run.
//! Consulted by the scheduler right before slots would be acquired.

use std::time::SystemTime;

use strum::Display;

use crate::graph::{Graph, NodeIndex, Outcome, State};
use crate::options::Options;
use crate::rule::RuleSet;
use crate::util::Mtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Decision {
    Run,
    Skip,
    Pretend,
}

pub fn evaluate(graph: &mut Graph, rules: &RuleSet, options: &Options, index: NodeIndex) -> Decision {
    let node = graph.node(index);
    let Some(rule_index) = node.rule else {
        // plain source file
        return Decision::Skip;
    };
    let rule = rules.get(rule_index);

    let members = graph.group_members(index);
    let member_names: Vec<String> = members.iter().map(|&m| graph.node(m).name.clone()).collect();

    // user-asserted freshness wins over everything, including -B
    if options
        .pretend
        .iter()
        .any(|p| member_names.iter().any(|n| p.match_target(n).is_some()))
    {
        return Decision::Pretend;
    }

    // -b: only the listed targets may run
    if !options.build_only.is_empty() {
        return if member_names.iter().any(|n| options.build_only.contains(n)) {
            Decision::Run
        } else {
            Decision::Skip
        };
    }

    if options.force && !node.type_only {
        return Decision::Run;
    }

    if rule.task || rule.always_build {
        return Decision::Run;
    }

    // oldest mtime across the output group; any missing output means run
    let mut oldest: Option<SystemTime> = None;
    for &member in &members {
        match graph.mtime(member, &options.dir) {
            Mtime::At(time) => oldest = Some(oldest.map_or(time, |o| o.min(time))),
            _ => return Decision::Run,
        }
    }
    let oldest = oldest.expect("group has at least one member");

    // a rebuilt or newer ordinary prerequisite forces a run; type-prereqs
    // are ordering edges only
    let mut prereqs: Vec<NodeIndex> = members.iter().flat_map(|&m| graph.node(m).prereqs.clone()).collect();
    prereqs.sort_unstable();
    prereqs.dedup();

    for prereq in prereqs {
        // an absorbed side output depends on its own group's leader;
        // edges inside the group say nothing about staleness
        if members.contains(&prereq) {
            continue;
        }
        if graph.node(prereq).state == State::Done(Outcome::Built) {
            return Decision::Run;
        }
        if let Mtime::At(time) = graph.mtime(prereq, &options.dir) {
            if time > oldest {
                return Decision::Run;
            }
        }
    }

    Decision::Skip
}
