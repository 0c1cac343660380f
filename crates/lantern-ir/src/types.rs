use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar kinds a primitive descriptor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Char,
    /// Owned `String`.
    String,
    /// Borrowed `&'static str`.
    Str,
}

impl PrimitiveKind {
    pub fn is_integer(self) -> bool {
        self.int_bounds().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_text(self) -> bool {
        matches!(self, PrimitiveKind::String | PrimitiveKind::Str)
    }

    /// Inclusive value range for integer kinds. `isize`/`usize` are
    /// treated as 64-bit.
    pub fn int_bounds(self) -> Option<(i128, i128)> {
        let bounds = match self {
            PrimitiveKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveKind::I64 | PrimitiveKind::Isize => (i64::MIN as i128, i64::MAX as i128),
            PrimitiveKind::U8 => (0, u8::MAX as i128),
            PrimitiveKind::U16 => (0, u16::MAX as i128),
            PrimitiveKind::U32 => (0, u32::MAX as i128),
            PrimitiveKind::U64 | PrimitiveKind::Usize => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    /// Spelling of the kind in Rust source.
    pub fn rust_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::Isize => "isize",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::Usize => "usize",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Char => "char",
            PrimitiveKind::String => "String",
            PrimitiveKind::Str => "&str",
        }
    }

    /// Inverse of [`PrimitiveKind::rust_name`] for path-like spellings
    /// (`str` is reached through a reference, so it is not matched here).
    pub fn from_rust_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => PrimitiveKind::Bool,
            "i8" => PrimitiveKind::I8,
            "i16" => PrimitiveKind::I16,
            "i32" => PrimitiveKind::I32,
            "i64" => PrimitiveKind::I64,
            "isize" => PrimitiveKind::Isize,
            "u8" => PrimitiveKind::U8,
            "u16" => PrimitiveKind::U16,
            "u32" => PrimitiveKind::U32,
            "u64" => PrimitiveKind::U64,
            "usize" => PrimitiveKind::Usize,
            "f32" => PrimitiveKind::F32,
            "f64" => PrimitiveKind::F64,
            "char" => PrimitiveKind::Char,
            "String" => PrimitiveKind::String,
            _ => return None,
        };
        Some(kind)
    }
}

/// Structural description of a value's shape.
///
/// Descriptors are immutable once built. Self-referential shapes are
/// expressed through [`TypeDescriptor::Named`] references into a
/// [`TypeTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Primitive {
        primitive: PrimitiveKind,
        /// Newtype name wrapping the primitive (`struct UserId(pub i64)`).
        #[serde(default)]
        alias: Option<String>,
    },
    /// Nullable owning pointer, `Option<Box<T>>`.
    Pointer { pointee: Box<TypeDescriptor> },
    /// `Vec<T>`, or `[T; len]` when `len` is set.
    Slice {
        element: Box<TypeDescriptor>,
        #[serde(default)]
        len: Option<usize>,
    },
    /// `HashMap<K, V>`.
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Struct {
        name: String,
        /// Canonical item path, e.g. `crate::model::User`.
        #[serde(default)]
        path: Option<String>,
        fields: Vec<FieldDescriptor>,
    },
    /// Reference to an entry of a [`TypeTable`].
    Named { name: String },
    Function {
        #[serde(default)]
        params: Vec<TypeDescriptor>,
        #[serde(default)]
        results: Vec<TypeDescriptor>,
        /// `Box<dyn Fn(..)>` rather than a bare closure / fn pointer.
        #[serde(default)]
        boxed: bool,
    },
    /// A trait object; only a few well-known shapes are synthesizable.
    Interface { name: String },
}

impl TypeDescriptor {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeDescriptor::Primitive {
            primitive: kind,
            alias: None,
        }
    }

    pub fn alias(kind: PrimitiveKind, alias: impl Into<String>) -> Self {
        TypeDescriptor::Primitive {
            primitive: kind,
            alias: Some(alias.into()),
        }
    }

    pub fn pointer(pointee: TypeDescriptor) -> Self {
        TypeDescriptor::Pointer {
            pointee: Box::new(pointee),
        }
    }

    pub fn slice(element: TypeDescriptor) -> Self {
        TypeDescriptor::Slice {
            element: Box::new(element),
            len: None,
        }
    }

    pub fn array(element: TypeDescriptor, len: usize) -> Self {
        TypeDescriptor::Slice {
            element: Box::new(element),
            len: Some(len),
        }
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeDescriptor::Named { name: name.into() }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        TypeDescriptor::Interface { name: name.into() }
    }

    /// Short tag used in logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Primitive { .. } => "primitive",
            TypeDescriptor::Pointer { .. } => "pointer",
            TypeDescriptor::Slice { .. } => "slice",
            TypeDescriptor::Map { .. } => "map",
            TypeDescriptor::Struct { .. } => "struct",
            TypeDescriptor::Named { .. } => "named",
            TypeDescriptor::Function { .. } => "function",
            TypeDescriptor::Interface { .. } => "interface",
        }
    }

    /// The name an injector override is keyed by, if this shape has one.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Primitive { alias, .. } => alias.as_deref(),
            TypeDescriptor::Struct { name, .. }
            | TypeDescriptor::Named { name }
            | TypeDescriptor::Interface { name } => Some(name),
            _ => None,
        }
    }
}

/// One struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// `pub` fields only are assignable from generated code.
    #[serde(default = "default_exported")]
    pub exported: bool,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

fn default_exported() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            exported: true,
            ty,
        }
    }

    pub fn private(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            exported: false,
            ty,
        }
    }
}

/// Interface shapes with built-in synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownInterface {
    /// `Box<dyn std::error::Error>`.
    Error,
    /// `Box<dyn std::io::Write>`.
    ByteSink,
    /// `Box<dyn std::io::Read>`.
    ByteSource,
    /// `tokio_util::sync::CancellationToken`.
    Cancellation,
}

impl KnownInterface {
    pub fn from_name(name: &str) -> Option<Self> {
        let known = match name {
            "Error" | "std::error::Error" | "core::error::Error" => KnownInterface::Error,
            "Write" | "std::io::Write" | "io::Write" => KnownInterface::ByteSink,
            "Read" | "std::io::Read" | "io::Read" => KnownInterface::ByteSource,
            "CancellationToken" | "tokio_util::sync::CancellationToken" => {
                KnownInterface::Cancellation
            }
            _ => return None,
        };
        Some(known)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("unresolved type '{name}'")]
    Unresolved { name: String },

    #[error("named type '{name}' only refers to itself")]
    NamedCycle { name: String },
}

/// Named type definitions reachable from a target signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTable {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: TypeDescriptor) {
        self.types.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Look up a named type.
    pub fn resolve(&self, name: &str) -> Result<&TypeDescriptor, TypeError> {
        self.types.get(name).ok_or_else(|| TypeError::Unresolved {
            name: name.to_string(),
        })
    }

    /// Follow `Named` references until a concrete shape is reached.
    pub fn resolve_shallow<'a>(
        &'a self,
        ty: &'a TypeDescriptor,
    ) -> Result<&'a TypeDescriptor, TypeError> {
        let mut current = ty;
        // A chain longer than the table is a Named -> Named loop.
        for _ in 0..=self.types.len() {
            match current {
                TypeDescriptor::Named { name } => current = self.resolve(name)?,
                other => return Ok(other),
            }
        }
        Err(TypeError::NamedCycle {
            name: ty.type_name().unwrap_or_default().to_string(),
        })
    }

    /// Check that every `Named` reference reachable from the table
    /// resolves to a concrete shape.
    pub fn validate(&self) -> Result<(), TypeError> {
        for ty in self.types.values() {
            self.validate_descriptor(ty)?;
        }
        Ok(())
    }

    /// Check that every `Named` reference reachable from `ty` resolves.
    pub fn validate_descriptor(&self, ty: &TypeDescriptor) -> Result<(), TypeError> {
        match ty {
            TypeDescriptor::Primitive { .. } | TypeDescriptor::Interface { .. } => Ok(()),
            TypeDescriptor::Named { .. } => self.resolve_shallow(ty).map(|_| ()),
            TypeDescriptor::Pointer { pointee } => self.validate_descriptor(pointee),
            TypeDescriptor::Slice { element, .. } => self.validate_descriptor(element),
            TypeDescriptor::Map { key, value } => {
                self.validate_descriptor(key)?;
                self.validate_descriptor(value)
            }
            TypeDescriptor::Struct { fields, .. } => {
                for field in fields {
                    // Named fields are checked by name only; recursing into
                    // them would loop on self-referential structs.
                    match &field.ty {
                        TypeDescriptor::Named { .. } => {
                            self.resolve_shallow(&field.ty)?;
                        }
                        other => self.validate_descriptor(other)?,
                    }
                }
                Ok(())
            }
            TypeDescriptor::Function { params, results, .. } => {
                for t in params.iter().chain(results) {
                    self.validate_descriptor(t)?;
                }
                Ok(())
            }
        }
    }
}
