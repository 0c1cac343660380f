use lantern_ir::PrimitiveKind;

/// A synthesized value, carrying enough type information to be rendered
/// back to a literal of exactly its original type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int {
        value: i128,
        kind: PrimitiveKind,
    },
    Float {
        value: f64,
        kind: PrimitiveKind,
    },
    Char(char),
    /// `String` or `&str`, per `kind`.
    Text {
        value: String,
        kind: PrimitiveKind,
    },
    /// A primitive wrapped in its newtype.
    Alias {
        name: String,
        inner: Box<Value>,
    },
    /// The null pointer.
    Nil,
    Pointer(Box<Value>),
    Seq {
        elements: Vec<Value>,
        /// Fixed-size array; its length never changes.
        fixed: bool,
    },
    Map(Vec<(Value, Value)>),
    Struct {
        name: String,
        path: Option<String>,
        /// Exported fields only, in declaration order.
        fields: Vec<(String, Value)>,
        /// False when unexported fields are left at their zero value.
        complete: bool,
    },
    /// Stub callable returning fixed results.
    Func {
        arity: usize,
        results: Vec<Value>,
        boxed: bool,
    },
    Interface(InterfaceValue),
    /// Caller-supplied literal from the injector table.
    Injected {
        type_name: String,
        literal: String,
        imports: Vec<String>,
    },
    /// The type's zero value (`Default::default()`).
    Zero,
}

/// Payloads of the well-known interface shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceValue {
    Error { message: String },
    ByteSink,
    ByteSource { bytes: Vec<u8> },
    Cancellation { cancelled: bool },
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Nesting depth of struct values, used by tests and logs.
    pub fn struct_depth(&self) -> usize {
        match self {
            Value::Struct { fields, .. } => {
                1 + fields
                    .iter()
                    .map(|(_, v)| v.struct_depth())
                    .max()
                    .unwrap_or(0)
            }
            Value::Pointer(inner) | Value::Alias { inner, .. } => inner.struct_depth(),
            Value::Seq { elements, .. } => {
                elements.iter().map(Value::struct_depth).max().unwrap_or(0)
            }
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| k.struct_depth().max(v.struct_depth()))
                .max()
                .unwrap_or(0),
            Value::Func { results, .. } => {
                results.iter().map(Value::struct_depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}
