// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Pretend-up-to-date semantics, always-build rules and the -b/-B gates.

mod common;

use common::Sandbox;
use produce::Options;

const CHAIN: &str = "\
[T]
dep.u: U
recipe: touch T

[U]
dep.v: V
recipe: touch U

[V]
recipe: touch V
";

fn pretend_u(options: &mut Options) {
    options.pretend = vec!["U".parse().unwrap()];
}

#[tokio::test]
async fn pretended_nodes_are_left_alone() {
    let sandbox = Sandbox::new(CHAIN);
    sandbox.produce(&["T"]).await.unwrap();

    // a fresh leaf under the pretended node changes: nothing happens
    sandbox.sleep();
    sandbox.touch("V");
    let times = (sandbox.mtime("T"), sandbox.mtime("U"), sandbox.mtime("V"));
    sandbox.sleep();
    sandbox.produce_with(&["T"], pretend_u).await.unwrap();
    assert_eq!((sandbox.mtime("T"), sandbox.mtime("U"), sandbox.mtime("V")), times);
}

#[tokio::test]
async fn stale_leaves_below_a_pretended_node_are_touched() {
    let sandbox = Sandbox::new(CHAIN);
    sandbox.produce(&["T"]).await.unwrap();

    // U changes, then V: T is genuinely stale with respect to U
    sandbox.sleep();
    sandbox.touch("U");
    let u_time = sandbox.mtime("U");
    sandbox.sleep();
    sandbox.touch("V");
    let v_time = sandbox.mtime("V");
    sandbox.sleep();

    sandbox.produce_with(&["T"], pretend_u).await.unwrap();

    // T was rebuilt and V was touched past it; U stayed put
    assert_eq!(sandbox.mtime("U"), u_time, "U was not rebuilt");
    assert!(sandbox.mtime("T") > u_time, "T was rebuilt");
    assert!(sandbox.mtime("V") > v_time, "V was touched");
    assert!(sandbox.mtime("V") > sandbox.mtime("T"), "V ends up newer than T");

    // deleting the pretended intermediate must not lose the change: an
    // honest run still rebuilds U and T
    sandbox.remove("U");
    let t_time = sandbox.mtime("T");
    sandbox.sleep();
    sandbox.produce(&["T"]).await.unwrap();
    assert!(sandbox.exists("U"));
    assert!(sandbox.mtime("T") > t_time, "T was rebuilt after the pretence");
}

#[tokio::test]
async fn pretence_survives_forced_rebuilds() {
    let sandbox = Sandbox::new(CHAIN);
    sandbox.produce(&["T"]).await.unwrap();

    sandbox.sleep();
    sandbox.touch("U");
    let u_time = sandbox.mtime("U");
    sandbox.sleep();

    sandbox
        .produce_with(&["T"], |options| {
            options.force = true;
            pretend_u(options);
        })
        .await
        .unwrap();

    assert_eq!(sandbox.mtime("U"), u_time, "-B does not override -u");
    assert!(sandbox.mtime("T") > u_time, "T was rebuilt");
}

#[tokio::test]
async fn pretend_accepts_patterns() {
    let sandbox = Sandbox::new(
        "[a1]\ndep.b: b1\nrecipe: touch a1\n\
         [b${i}]\ndep.c: c${i}\ndep.d: d${i}\nrecipe: touch b${i}\n\
         [c${i}]\nrecipe: touch c${i}\n\
         [d${i}]\nrecipe: touch d${i}\n",
    );
    let pretending = |options: &mut Options| options.pretend = vec!["b${i}".parse().unwrap()];

    sandbox.produce(&["a1"]).await.unwrap();

    // a changed ingredient under the pretended pattern: nothing happens
    sandbox.sleep();
    sandbox.touch("c1");
    let times = (sandbox.mtime("a1"), sandbox.mtime("b1"), sandbox.mtime("c1"));
    sandbox.sleep();
    sandbox.produce_with(&["a1"], pretending).await.unwrap();
    assert_eq!((sandbox.mtime("a1"), sandbox.mtime("b1"), sandbox.mtime("c1")), times);

    // bring everything up to date, then change the pretended node itself
    sandbox.produce(&["a1"]).await.unwrap();
    sandbox.sleep();
    sandbox.touch("b1");
    let b_time = sandbox.mtime("b1");
    sandbox.sleep();
    sandbox.produce_with(&["a1"], pretending).await.unwrap();
    assert_eq!(sandbox.mtime("b1"), b_time, "b1 itself is pretended");
    assert!(sandbox.mtime("a1") > b_time, "a1 sees b1's change");
}

#[tokio::test]
async fn always_build_rules_run_every_time() {
    let sandbox = Sandbox::new(
        "[a]\ndep.b: b\nrecipe: touch a\n\
         [b]\ndep.c: c\nalways_build: true\nrecipe: touch b\n",
    );
    sandbox.write("c", "c\n");

    sandbox.produce(&["a"]).await.unwrap();
    let (a1, b1) = (sandbox.mtime("a"), sandbox.mtime("b"));
    let c_time = sandbox.mtime("c");

    sandbox.sleep();
    sandbox.produce(&["a"]).await.unwrap();
    assert!(sandbox.mtime("b") > b1, "b always rebuilds");
    assert!(sandbox.mtime("a") > a1, "a follows");
    assert_eq!(sandbox.mtime("c"), c_time, "sources are never touched");
}

#[tokio::test]
async fn build_only_restricts_recipes() {
    let sandbox = Sandbox::new(
        "[a]\ndep.b: b\nrecipe: touch a\n\
         [b]\ndep.c: c\nalways_build: true\nrecipe: touch b\n",
    );
    sandbox.write("c", "c\n");
    sandbox.produce(&["a"]).await.unwrap();

    let b_time = sandbox.mtime("b");
    let a_time = sandbox.mtime("a");
    sandbox.sleep();

    sandbox
        .produce_with(&["a"], |options| options.build_only = vec!["a".to_owned()])
        .await
        .unwrap();
    assert!(sandbox.mtime("a") > a_time, "the listed target is forced");
    assert_eq!(sandbox.mtime("b"), b_time, "everything else is left alone");
}

#[tokio::test]
async fn force_rebuilds_all_rule_targets() {
    let sandbox = Sandbox::new(
        "[a]\ndep.b: b\nrecipe: touch a\n\
         [b]\ndep.c: c\nrecipe: touch b\n",
    );
    sandbox.write("c", "c\n");
    sandbox.produce(&["a"]).await.unwrap();

    let (a_time, b_time, c_time) = (sandbox.mtime("a"), sandbox.mtime("b"), sandbox.mtime("c"));
    sandbox.sleep();

    sandbox.produce_with(&["a"], |options| options.force = true).await.unwrap();
    assert!(sandbox.mtime("a") > a_time);
    assert!(sandbox.mtime("b") > b_time);
    assert_eq!(sandbox.mtime("c"), c_time, "sources are not forced");
}
