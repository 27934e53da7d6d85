// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Depfile-declared secondary prerequisites.

mod common;

use common::Sandbox;

// A compiler-shaped setup without a compiler: `sayfib` links fib.o with
// its source, and a generated depfile declares the header dependency the
// build file does not know about.
const INI: &str = "\
[sayfib]
dep.c: sayfib.c
dep.o: fib.o
type.d: sayfib.d
recipe: cat sayfib.c fib.o > sayfib

[fib.o]
dep.c: fib.c
recipe: cat fib.c > fib.o

[sayfib.d]
dep.c: sayfib.c
recipe: printf 'sayfib: fib.h\\n' > sayfib.d
";

fn sandbox() -> Sandbox {
    let sandbox = Sandbox::new(INI);
    sandbox.write("sayfib.c", "int main() { return fib(10); }\n");
    sandbox.write("fib.c", "int fib(int n) { return n; }\n");
    sandbox.write("fib.h", "int fib(int n);\n");
    sandbox
}

#[tokio::test]
async fn depfile_deps_trigger_rebuilds() {
    let sandbox = sandbox();

    sandbox.produce(&["sayfib"]).await.unwrap();
    assert!(sandbox.exists("sayfib") && sandbox.exists("fib.o") && sandbox.exists("sayfib.d"));

    let object = sandbox.mtime("fib.o");
    let executable = sandbox.mtime("sayfib");
    let depfile = sandbox.mtime("sayfib.d");

    // the header is only known through the depfile: the executable is
    // rebuilt, the object file is not
    sandbox.sleep();
    sandbox.touch("fib.h");
    sandbox.sleep();
    sandbox.produce(&["sayfib"]).await.unwrap();
    assert!(sandbox.mtime("sayfib") > executable);
    assert_eq!(sandbox.mtime("fib.o"), object);
    assert_eq!(sandbox.mtime("sayfib.d"), depfile);

    // the source file is a dep of both the executable and the depfile
    let executable = sandbox.mtime("sayfib");
    sandbox.sleep();
    sandbox.touch("sayfib.c");
    sandbox.sleep();
    sandbox.produce(&["sayfib"]).await.unwrap();
    assert!(sandbox.mtime("sayfib") > executable);
    assert!(sandbox.mtime("sayfib.d") > depfile);
    assert_eq!(sandbox.mtime("fib.o"), object);
}

#[tokio::test]
async fn missing_depfile_is_not_an_error() {
    let sandbox = sandbox();
    // first build: sayfib.d is itself built, then consulted
    sandbox.produce(&["sayfib"]).await.unwrap();
    assert_eq!(sandbox.read("sayfib.d"), "sayfib: fib.h\n");
}
