//! Instrumented copies of the units under `fixtures/`, compiled as real
//! code. Every item carries the `_lt0` suffix.

pub mod shadowing {
    include!(env!("LANTERN_FIXTURE_SHADOWING"));
}

pub mod tasks {
    include!(env!("LANTERN_FIXTURE_TASKS"));
}

pub mod closures {
    include!(env!("LANTERN_FIXTURE_CLOSURES"));
}

pub mod iterators {
    include!(env!("LANTERN_FIXTURE_ITERATORS"));
}

pub mod branches {
    include!(env!("LANTERN_FIXTURE_BRANCHES"));
}

pub mod stand_ins {
    include!(env!("LANTERN_FIXTURE_STAND_INS"));
}

pub mod counter {
    include!(env!("LANTERN_FIXTURE_COUNTER"));
}
