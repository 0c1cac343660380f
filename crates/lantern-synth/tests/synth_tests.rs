use lantern_ir::types::{FieldDescriptor, PrimitiveKind, TypeDescriptor, TypeTable};
use lantern_synth::{
    candidate_rng, render, InjectorEntry, InjectorTable, NamespaceManager, SynthConfig,
    SynthError, SynthesisContext, Synthesizer, Value,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn linked_list_table() -> TypeTable {
    let mut table = TypeTable::new();
    table.insert(
        "Node",
        TypeDescriptor::Struct {
            name: "Node".into(),
            path: Some("crate::list::Node".into()),
            fields: vec![
                FieldDescriptor::new("value", TypeDescriptor::primitive(PrimitiveKind::I64)),
                FieldDescriptor::new(
                    "next",
                    TypeDescriptor::pointer(TypeDescriptor::named("Node")),
                ),
                FieldDescriptor::new(
                    "children",
                    TypeDescriptor::slice(TypeDescriptor::named("Node")),
                ),
            ],
        },
    );
    table
}

#[test]
fn test_self_referential_struct_terminates_within_cap() {
    init_logger();
    let table = linked_list_table();
    let config = SynthConfig {
        max_depth: 4,
        nil_probability: 0.0,
        max_fresh_elements: 2,
        append_probability: 1.0,
        ..Default::default()
    };
    let injectors = InjectorTable::new();
    let ctx = SynthesisContext::new(&injectors);
    let ty = TypeDescriptor::named("Node");

    for seed in 0..16 {
        let mut synth = Synthesizer::new(&table, config.clone(), candidate_rng(seed, 0));
        let mut value = synth.synthesize(ctx, &ty).unwrap();
        for _ in 0..4 {
            value = synth.mutate(ctx, &ty, &value).unwrap();
        }
        assert!(synth.deepest() <= 4, "depth {} past cap", synth.deepest());
        assert!(value.struct_depth() <= 4);
    }
}

#[test]
fn test_named_loop_without_struct_terminates() {
    let mut table = TypeTable::new();
    table.insert(
        "Chain",
        TypeDescriptor::pointer(TypeDescriptor::named("Chain")),
    );
    let config = SynthConfig {
        nil_probability: 0.0,
        ..Default::default()
    };
    let injectors = InjectorTable::new();
    let mut synth = Synthesizer::new(&table, config, candidate_rng(3, 0));
    let value = synth
        .synthesize(SynthesisContext::new(&injectors), &TypeDescriptor::named("Chain"))
        .unwrap();
    assert!(matches!(value, Value::Pointer(_)));
}

#[test]
fn test_alias_render_keeps_type() {
    let mut table = TypeTable::new();
    table.insert("UserId", TypeDescriptor::alias(PrimitiveKind::U32, "UserId"));
    let injectors = InjectorTable::new();
    let mut ns = NamespaceManager::new("crate::users");

    for seed in 0..8 {
        let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(seed, 0));
        let value = synth
            .synthesize(SynthesisContext::new(&injectors), &TypeDescriptor::named("UserId"))
            .unwrap();
        let text = render(&value, &mut ns);

        let expr: syn::Expr = syn::parse_str(&text).unwrap();
        let syn::Expr::Call(call) = expr else {
            panic!("expected a constructor call, got {text}");
        };
        let syn::Expr::Path(func) = call.func.as_ref() else {
            panic!("expected a path callee, got {text}");
        };
        assert!(func.path.is_ident("UserId"), "{text}");
        let arg = call.args.first().unwrap();
        let syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(lit),
            ..
        }) = arg
        else {
            panic!("expected an integer literal, got {text}");
        };
        assert_eq!(lit.suffix(), "u32");
    }
}

#[test]
fn test_unknown_interface_is_reported() {
    let table = TypeTable::new();
    let injectors = InjectorTable::new();
    let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(1, 0));
    let err = synth
        .synthesize(
            SynthesisContext::new(&injectors),
            &TypeDescriptor::interface("Storage"),
        )
        .unwrap_err();
    assert_eq!(
        err,
        SynthError::UnsynthesizableInterface {
            name: "Storage".into()
        }
    );
}

#[test]
fn test_injector_overrides_interface_and_field() {
    let mut table = TypeTable::new();
    table.insert(
        "Service",
        TypeDescriptor::Struct {
            name: "Service".into(),
            path: None,
            fields: vec![
                FieldDescriptor::new("store", TypeDescriptor::interface("Storage")),
                FieldDescriptor::private("cache", TypeDescriptor::primitive(PrimitiveKind::Usize)),
            ],
        },
    );
    let mut injectors = InjectorTable::new();
    injectors.insert(
        "Storage",
        InjectorEntry {
            sample: serde_json::json!("memory"),
            literal: "Box::new(MemoryStore::default())".into(),
            imports: vec!["crate::store::MemoryStore".into()],
        },
    );

    let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(5, 0));
    let value = synth
        .synthesize(SynthesisContext::new(&injectors), &TypeDescriptor::named("Service"))
        .unwrap();

    let mut ns = NamespaceManager::new("crate::service");
    let text = render(&value, &mut ns);
    assert_eq!(
        text,
        "Service { store: Box::new(MemoryStore::default()), ..Default::default() }"
    );
    assert_eq!(ns.resolve("MemoryStore"), Some("crate::store::MemoryStore"));
}

#[test]
fn test_known_interfaces_render_as_expressions() {
    let table = TypeTable::new();
    let injectors = InjectorTable::new();
    let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(9, 0));
    let mut ns = NamespaceManager::new("crate::io");

    for name in ["Error", "Write", "Read", "CancellationToken"] {
        let value = synth
            .synthesize(
                SynthesisContext::new(&injectors),
                &TypeDescriptor::interface(name),
            )
            .unwrap();
        let text = render(&value, &mut ns);
        assert!(syn::parse_str::<syn::Expr>(&text).is_ok(), "{name}: {text}");
    }
}

#[test]
fn test_empty_collections_get_small_literals() {
    let table = TypeTable::new();
    let injectors = InjectorTable::new();
    let ty = TypeDescriptor::slice(TypeDescriptor::primitive(PrimitiveKind::I32));

    for seed in 0..16 {
        let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(seed, 2));
        let value = synth.synthesize(SynthesisContext::new(&injectors), &ty).unwrap();
        match value {
            Value::Seq { elements, fixed } => {
                assert!(!fixed);
                assert!(elements.len() <= 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_same_seed_same_candidate() {
    let table = linked_list_table();
    let injectors = InjectorTable::new();
    let ty = TypeDescriptor::named("Node");
    let mut ns = NamespaceManager::new("crate::list");

    let mut a = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(42, 3));
    let mut b = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(42, 3));
    let va = a.synthesize(SynthesisContext::new(&injectors), &ty).unwrap();
    let vb = b.synthesize(SynthesisContext::new(&injectors), &ty).unwrap();
    assert_eq!(render(&va, &mut ns), render(&vb, &mut ns));
}

#[test]
fn test_stub_function_returns_declared_results() {
    let table = TypeTable::new();
    let injectors = InjectorTable::new();
    let ty = TypeDescriptor::Function {
        params: vec![TypeDescriptor::primitive(PrimitiveKind::I32)],
        results: vec![TypeDescriptor::primitive(PrimitiveKind::Bool)],
        boxed: false,
    };
    let mut synth = Synthesizer::new(&table, SynthConfig::default(), candidate_rng(0, 0));
    let value = synth.synthesize(SynthesisContext::new(&injectors), &ty).unwrap();
    let text = render(&value, &mut NamespaceManager::new("crate"));
    let expr: syn::Expr = syn::parse_str(&text).unwrap();
    match expr {
        syn::Expr::Closure(closure) => assert_eq!(closure.inputs.len(), 1),
        other => panic!("expected closure, got {other:?}"),
    }
}
