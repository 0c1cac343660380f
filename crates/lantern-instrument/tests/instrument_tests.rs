use lantern_instrument::{Instrumented, Instrumenter, RECORDER_IDENT};
use syn::visit::Visit;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Collects the ids of every `__lantern_rec.hit(id)` call.
#[derive(Default)]
struct HitIds {
    ids: Vec<u32>,
}

impl<'ast> Visit<'ast> for HitIds {
    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        if call.method == "hit" {
            if let Some(syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(lit),
                ..
            })) = call.args.first()
            {
                self.ids.push(lit.base10_parse().unwrap());
            }
        }
        syn::visit::visit_expr_method_call(self, call);
    }
}

fn hit_ids(out: &Instrumented) -> Vec<u32> {
    let file = syn::parse_file(&out.source).unwrap();
    let mut hits = HitIds::default();
    hits.visit_file(&file);
    hits.ids.sort_unstable();
    hits.ids
}

fn find_fn<'f>(file: &'f syn::File, name: &str) -> &'f syn::ItemFn {
    file.items
        .iter()
        .find_map(|item| match item {
            syn::Item::Fn(f) if f.sig.ident == name => Some(f),
            _ => None,
        })
        .unwrap()
}

const CLASSIFY: &str = r#"
fn classify(x: i64) -> i64 {
    let mut y = 0;
    if x > 0 {
        y += 1;
        y *= 2;
    } else {
        y -= 1;
        y *= 3;
    }
    y
}
"#;

#[test]
fn test_if_else_two_statements_each() {
    init_logger();
    let mut inst = Instrumenter::new("7");
    let out = inst.instrument("src/classify.rs", CLASSIFY, "classify").unwrap();

    assert_eq!(out.probe_count, 4);
    assert_eq!(out.functions["classify"], vec![0, 1, 2, 3]);
    assert_eq!(hit_ids(&out), vec![0, 1, 2, 3]);
    assert_eq!(out.target, "classify_lt7");
    assert_eq!(out.renamed["classify"], "classify_lt7");

    // The entry recorder is the first statement of the renamed function.
    let file = syn::parse_file(&out.source).unwrap();
    let func = find_fn(&file, "classify_lt7");
    match &func.block.stmts[0] {
        syn::Stmt::Local(local) => match &local.pat {
            syn::Pat::Ident(ident) => assert_eq!(ident.ident, RECORDER_IDENT),
            other => panic!("unexpected pattern {other:?}"),
        },
        other => panic!("expected recorder binding, got {other:?}"),
    }
    assert!(out.source.contains("enter"));
    assert!(out.source.contains("\"classify\""));
}

#[test]
fn test_probe_ids_are_monotonic_per_file() {
    let mut inst = Instrumenter::new("7");
    inst.instrument("src/classify.rs", CLASSIFY, "classify").unwrap();
    let again = inst.instrument("src/classify.rs", CLASSIFY, "classify").unwrap();
    assert_eq!(again.functions["classify"], vec![4, 5, 6, 7]);
    // The second rewrite is suffixed apart from the first.
    assert_eq!(again.run_id, "7_1");
    assert_eq!(again.target, "classify_lt7_1");

    // Another file starts its own counter.
    let other = inst.instrument("src/other.rs", CLASSIFY, "classify").unwrap();
    assert_eq!(other.functions["classify"], vec![0, 1, 2, 3]);
    assert_eq!(other.run_id, "7_2");
}

#[test]
fn test_empty_match_is_left_alone() {
    let source = r#"
        enum Never {}
        fn absurd(x: Never) -> u8 {
            match x {}
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/never.rs", source, "absurd").unwrap();

    assert_eq!(out.probe_count, 0);
    assert_eq!(out.skipped, 1);

    let file = syn::parse_file(&out.source).unwrap();
    let func = find_fn(&file, "absurd_lt1");
    let tail = func.block.stmts.last().unwrap();
    match tail {
        syn::Stmt::Expr(syn::Expr::Match(m), None) => assert!(m.arms.is_empty()),
        other => panic!("expected the bare match, got {other:?}"),
    }
}

#[test]
fn test_else_if_gets_synthetic_block() {
    let source = r#"
        fn sign(x: i32) -> i32 {
            if x > 0 { 1 } else if x < 0 { -1 } else { 0 }
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/sign.rs", source, "sign").unwrap();
    assert_eq!(out.probe_count, 4);

    let file = syn::parse_file(&out.source).unwrap();
    let func = find_fn(&file, "sign_lt1");
    let syn::Stmt::Expr(syn::Expr::If(outer), None) = func.block.stmts.last().unwrap() else {
        panic!("expected if as tail expression");
    };
    let (_, else_branch) = outer.else_branch.as_ref().unwrap();
    let syn::Expr::Block(block) = else_branch.as_ref() else {
        panic!("else-if was not wrapped in a block");
    };
    assert_eq!(block.block.stmts.len(), 2);
    assert!(matches!(block.block.stmts[1], syn::Stmt::Expr(syn::Expr::If(_), None)));
}

#[test]
fn test_match_arms_are_probed() {
    let source = r#"
        fn describe(n: u8) -> &'static str {
            match n {
                0 => "zero",
                1 => { "one" }
                _ => {}
            }
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/describe.rs", source, "describe").unwrap();
    // The empty arm block is skipped.
    assert_eq!(out.probe_count, 2);
    assert_eq!(out.skipped, 1);
}

#[test]
fn test_return_arity_mismatch_is_skipped() {
    let source = r#"
        fn split(x: i32) -> (i32, bool) {
            if x > 0 {
                return (x, true);
            }
            let pair = (x, false);
            return pair;
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/split.rs", source, "split").unwrap();
    // One statement probe in the `if` body plus the exit probe on the
    // tuple-literal return; `return pair` stays as it was.
    assert_eq!(out.probe_count, 2);
    assert_eq!(out.skipped, 1);
    assert_eq!(hit_ids(&out), vec![0, 1]);
}

#[test]
fn test_spawned_move_closure_gets_task_recorder() {
    let source = r#"
        fn launch(n: u32) {
            let handle = std::thread::spawn(move || {
                if n > 1 {
                    println!("big");
                }
            });
            handle.join().unwrap();
        }
    "#;
    let mut inst = Instrumenter::new("3");
    let out = inst.instrument("src/launch.rs", source, "launch").unwrap();

    assert_eq!(out.probe_count, 1);
    assert_eq!(out.functions["launch"], Vec::<u32>::new());
    assert_eq!(out.functions["launch$task0"], vec![0]);
    assert!(out.source.contains("enter_task"));
    assert!(out.source.contains("TaskOrigin :: capture ()"));
}

#[test]
fn test_spawned_borrowing_closure_gets_task_recorder() {
    let source = r#"
        fn launch() {
            std::thread::spawn(|| {
                let total = 2 + 2;
                if total > 3 {
                    drop(total);
                }
            })
            .join()
            .unwrap();
        }
    "#;
    let mut inst = Instrumenter::new("3");
    let out = inst.instrument("src/launch.rs", source, "launch").unwrap();

    // The hit lives in the task's own frame, next to its own recorder.
    assert_eq!(out.functions["launch$task0"], vec![0]);
    assert_eq!(out.skipped, 0);
    let file = syn::parse_file(&out.source).unwrap();
    let func = find_fn(&file, "launch_lt3");
    let text = quote::ToTokens::to_token_stream(func).to_string();
    let entry = text.find("enter_task").unwrap();
    let hit = text.find("hit (0u32)").unwrap();
    assert!(entry < hit);
}

#[test]
fn test_each_spawn_gets_its_own_task_identity() {
    let source = r#"
        fn fan(n: u32) {
            let a = std::thread::spawn(move || {
                if n > 1 {
                    println!("a");
                }
            });
            let b = std::thread::spawn(|| {
                let total = 2 + 2;
                if total > 3 {
                    drop(total);
                }
            });
            a.join().unwrap();
            b.join().unwrap();
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/fan.rs", source, "fan").unwrap();

    assert_eq!(out.functions["fan"], Vec::<u32>::new());
    assert_eq!(out.functions["fan$task0"], vec![0]);
    assert_eq!(out.functions["fan$task1"], vec![1]);
    assert_eq!(out.source.matches("enter_task").count(), 2);
    assert_eq!(out.source.matches("TaskOrigin :: capture ()").count(), 2);
}

#[test]
fn test_returned_iterator_closure_gets_no_hits() {
    let source = r#"
        fn doubled(v: &[u8]) -> impl Iterator<Item = u8> + '_ {
            v.iter().map(|x| if *x > 10 { 0 } else { x * 2 })
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/doubled.rs", source, "doubled").unwrap();
    assert_eq!(out.probe_count, 0);
    assert_eq!(out.skipped, 1);
    assert!(hit_ids(&out).is_empty());
}

#[test]
fn test_escaping_local_closure_gets_no_hits() {
    let source = r#"
        fn pick(v: Vec<u8>) -> Vec<u8> {
            let bump = |x: u8| if x > 1 { x } else { x + 1 };
            let also = bump;
            let first = also(1);
            let keep = |x: &u8| *x > 0;
            let rest: Vec<u8> = v.into_iter().filter(|x| keep(x)).collect();
            rest.into_iter().chain([first]).collect()
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/pick.rs", source, "pick").unwrap();
    // `bump` is moved into another local and `keep` is called from inside
    // another closure; neither body references the recorder.
    assert_eq!(out.probe_count, 0);
    assert_eq!(out.skipped, 3);
}

#[test]
fn test_plain_move_closure_is_not_probed() {
    let source = r#"
        fn keep(v: Vec<u8>) -> usize {
            let count = move || { v.len() };
            let add = |a: usize| a + 1;
            add(count())
        }
    "#;
    let mut inst = Instrumenter::new("3");
    let out = inst.instrument("src/keep.rs", source, "keep").unwrap();
    // Only the closure called in place gets a hit site.
    assert_eq!(out.probe_count, 1);
    assert_eq!(out.skipped, 1);
}

#[test]
fn test_method_target() {
    let source = r#"
        pub struct Counter { pub n: u32 }
        impl Counter {
            pub fn bump(&mut self, by: u32) {
                if by > 0 {
                    self.n += by;
                }
            }
        }
    "#;
    let mut inst = Instrumenter::new("5");
    let out = inst.instrument("src/counter.rs", source, "Counter::bump").unwrap();
    assert_eq!(out.functions["Counter::bump"], vec![0]);
    assert_eq!(out.target, "Counter_lt5::bump");
    assert!(out.source.contains("impl Counter_lt5"));
}

#[test]
fn test_macro_bodies_are_opaque() {
    let source = r#"
        fn show(flag: bool) {
            println!("{}", if flag { 1 } else { 2 });
        }
    "#;
    let mut inst = Instrumenter::new("1");
    let out = inst.instrument("src/show.rs", source, "show").unwrap();
    assert_eq!(out.probe_count, 0);
}

#[test]
fn test_missing_target() {
    let mut inst = Instrumenter::new("1");
    let err = inst.instrument("src/classify.rs", CLASSIFY, "nope").unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_parse_error() {
    let mut inst = Instrumenter::new("1");
    assert!(matches!(
        inst.instrument("bad.rs", "fn (", "f"),
        Err(lantern_instrument::InstrumentError::Parse { .. })
    ));
}
