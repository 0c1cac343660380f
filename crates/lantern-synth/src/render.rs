//! Rendering synthesized values back to Rust expression syntax.
//!
//! Every literal keeps its exact type: integers and floats carry a type
//! suffix and newtype aliases are wrapped in their constructor, so the
//! expression type-checks against the declared parameter without context.

use crate::namespace::NamespaceManager;
use crate::value::{InterfaceValue, Value};
use lantern_ir::PrimitiveKind;

const HASH_MAP_PATH: &str = "std::collections::HashMap";
const CURSOR_PATH: &str = "std::io::Cursor";
const CANCELLATION_PATH: &str = "tokio_util::sync::CancellationToken";

/// Render `value` as a Rust expression, binding any imports it needs.
pub fn render(value: &Value, ns: &mut NamespaceManager) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int { value, kind } => format!("{value}{}", kind.rust_name()),
        Value::Float { value, kind } => render_float(*value, *kind),
        Value::Char(c) => format!("{c:?}"),
        Value::Text { value, kind } => match kind {
            PrimitiveKind::Str => format!("{value:?}"),
            _ => format!("String::from({value:?})"),
        },
        Value::Alias { name, inner } => format!("{name}({})", render(inner, ns)),
        Value::Nil => "None".to_string(),
        Value::Pointer(inner) => format!("Some(Box::new({}))", render(inner, ns)),
        Value::Seq { elements, fixed } => {
            let items = render_list(elements, ns);
            if *fixed {
                format!("[{items}]")
            } else {
                format!("vec![{items}]")
            }
        }
        Value::Map(entries) => {
            let map = ns.bind("HashMap", HASH_MAP_PATH).local_name;
            if entries.is_empty() {
                return format!("{map}::new()");
            }
            let pairs: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("({}, {})", render(k, ns), render(v, ns)))
                .collect();
            format!("{map}::from([{}])", pairs.join(", "))
        }
        Value::Struct {
            name,
            path,
            fields,
            complete,
        } => {
            let local = match path {
                Some(path) => ns.bind(name, path).local_name,
                None => name.clone(),
            };
            let mut parts: Vec<String> = fields
                .iter()
                .map(|(field, v)| format!("{field}: {}", render(v, ns)))
                .collect();
            if !complete {
                parts.push("..Default::default()".to_string());
            }
            if parts.is_empty() {
                format!("{local} {{}}")
            } else {
                format!("{local} {{ {} }}", parts.join(", "))
            }
        }
        Value::Func {
            arity,
            results,
            boxed,
        } => {
            let params = vec!["_"; *arity].join(", ");
            let body = match results.as_slice() {
                [] => "()".to_string(),
                [single] => render(single, ns),
                many => format!("({})", render_list(many, ns)),
            };
            let closure = format!("|{params}| {body}");
            if *boxed {
                format!("Box::new({closure})")
            } else {
                closure
            }
        }
        Value::Interface(interface) => render_interface(interface, ns),
        Value::Injected {
            type_name,
            literal,
            imports,
        } => {
            for path in imports {
                let hint = path.rsplit("::").next().unwrap_or(path);
                let bound = ns.bind(hint, path);
                if bound.local_name != hint {
                    log::warn!(
                        "injector literal for {type_name} imports {path}, \
                         which is already bound elsewhere as {}",
                        bound.local_name
                    );
                }
            }
            literal.clone()
        }
        Value::Zero => "Default::default()".to_string(),
    }
}

/// Render a comma-separated argument list.
pub fn render_list(values: &[Value], ns: &mut NamespaceManager) -> String {
    values
        .iter()
        .map(|v| render(v, ns))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_float(value: f64, kind: PrimitiveKind) -> String {
    let text = match kind {
        PrimitiveKind::F32 => format!("{:?}", value as f32),
        _ => format!("{value:?}"),
    };
    format!("{text}{}", kind.rust_name())
}

fn render_interface(interface: &InterfaceValue, ns: &mut NamespaceManager) -> String {
    match interface {
        InterfaceValue::Error { message } => format!("{message:?}.into()"),
        InterfaceValue::ByteSink => "Box::new(Vec::<u8>::new())".to_string(),
        InterfaceValue::ByteSource { bytes } => {
            let cursor = ns.bind("Cursor", CURSOR_PATH).local_name;
            let data = if bytes.is_empty() {
                "Vec::<u8>::new()".to_string()
            } else {
                let items: Vec<String> = bytes.iter().map(|b| format!("{b}u8")).collect();
                format!("vec![{}]", items.join(", "))
            };
            format!("Box::new({cursor}::new({data}))")
        }
        InterfaceValue::Cancellation { cancelled } => {
            let token = ns.bind("CancellationToken", CANCELLATION_PATH).local_name;
            if *cancelled {
                format!("{{ let token = {token}::new(); token.cancel(); token }}")
            } else {
                format!("{token}::new()")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> NamespaceManager {
        NamespaceManager::new("crate::demo")
    }

    #[test]
    fn test_int_literals_are_suffixed() {
        let value = Value::Int {
            value: -5,
            kind: PrimitiveKind::I64,
        };
        assert_eq!(render(&value, &mut ns()), "-5i64");
    }

    #[test]
    fn test_float_literal_keeps_point() {
        let value = Value::Float {
            value: 2.0,
            kind: PrimitiveKind::F64,
        };
        assert_eq!(render(&value, &mut ns()), "2.0f64");
    }

    #[test]
    fn test_text_is_escaped() {
        let owned = Value::Text {
            value: "a\"b".into(),
            kind: PrimitiveKind::String,
        };
        let borrowed = Value::Text {
            value: "x".into(),
            kind: PrimitiveKind::Str,
        };
        assert_eq!(render(&owned, &mut ns()), r#"String::from("a\"b")"#);
        assert_eq!(render(&borrowed, &mut ns()), r#""x""#);
    }

    #[test]
    fn test_incomplete_struct_fills_defaults() {
        let value = Value::Struct {
            name: "Config".into(),
            path: Some("crate::demo::Config".into()),
            fields: vec![("retries".into(), Value::Int {
                value: 3,
                kind: PrimitiveKind::U32,
            })],
            complete: false,
        };
        let mut ns = ns();
        assert_eq!(
            render(&value, &mut ns),
            "Config { retries: 3u32, ..Default::default() }"
        );
        assert!(ns.imports().is_empty());
    }

    #[test]
    fn test_map_binds_hash_map() {
        let mut ns = ns();
        let value = Value::Map(vec![(
            Value::Bool(true),
            Value::Char('z'),
        )]);
        assert_eq!(render(&value, &mut ns), "HashMap::from([(true, 'z')])");
        assert_eq!(ns.imports()[0].path, "std::collections::HashMap");
    }

    #[test]
    fn test_boxed_stub_closure() {
        let value = Value::Func {
            arity: 2,
            results: vec![Value::Bool(false)],
            boxed: true,
        };
        assert_eq!(render(&value, &mut ns()), "Box::new(|_, _| false)");
    }
}
