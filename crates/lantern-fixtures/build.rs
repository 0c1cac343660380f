//! Instruments every unit under `fixtures/` so the library compiles the
//! rewritten source exactly as a generated suite would.

use std::path::PathBuf;
use std::{env, fs};

use lantern_instrument::Instrumenter;

struct Fixture {
    name: &'static str,
    target: &'static str,
    mocks: &'static [&'static str],
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        name: "shadowing",
        target: "total",
        mocks: &[],
    },
    Fixture {
        name: "tasks",
        target: "launch",
        mocks: &[],
    },
    Fixture {
        name: "closures",
        target: "pick",
        mocks: &[],
    },
    Fixture {
        name: "iterators",
        target: "doubled",
        mocks: &[],
    },
    Fixture {
        name: "branches",
        target: "split",
        mocks: &[],
    },
    Fixture {
        name: "stand_ins",
        target: "lookup",
        mocks: &["fetch"],
    },
    Fixture {
        name: "counter",
        target: "Counter::bump",
        mocks: &[],
    },
];

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));
    for fixture in FIXTURES {
        let path = format!("fixtures/{}.rs", fixture.name);
        let source = fs::read_to_string(&path).expect("fixture source should be readable");
        let mocks: Vec<String> = fixture.mocks.iter().map(|m| m.to_string()).collect();

        let mut instrumenter = Instrumenter::new("0");
        let instrumented = instrumenter
            .instrument_with_mocks(&path, &source, fixture.target, &mocks)
            .unwrap_or_else(|err| panic!("instrumenting {path} failed: {err}"));

        let out = out_dir.join(format!("{}.rs", fixture.name));
        fs::write(&out, &instrumented.source).expect("instrumented fixture should be writable");
        println!(
            "cargo:rustc-env=LANTERN_FIXTURE_{}={}",
            fixture.name.to_uppercase(),
            out.display()
        );
        println!("cargo:rerun-if-changed={path}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
